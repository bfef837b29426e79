use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::graph::Record;
use crate::llm::{LanguageModel, Message, TextStream};

use super::prompts::{grounded_messages, open_domain_messages};

pub const DEFAULT_MAX_GROUNDING_RECORDS: usize = 5;

/// Turns records into a natural-language answer
///
/// Whole and stream modes build the same prompt, so concatenating a stream
/// gives the whole-mode text for the same model behavior.
#[derive(Clone)]
pub struct ResponseFormatter {
    llm: Arc<dyn LanguageModel>,
    system_prompt: Arc<str>,
    max_records: usize,
}

impl ResponseFormatter {
    pub fn new(llm: Arc<dyn LanguageModel>, system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            max_records: DEFAULT_MAX_GROUNDING_RECORDS,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Prompt for answering `question` from the leading records
    pub fn grounded_prompt(&self, question: &str, records: &[Record]) -> Vec<Message> {
        let grounding = &records[..records.len().min(self.max_records)];
        debug!(
            records = records.len(),
            grounding = grounding.len(),
            "Building grounded prompt"
        );
        grounded_messages(&self.system_prompt, question, grounding)
    }

    /// Prompt for answering `question` without any records
    pub fn open_domain(&self, question: &str) -> Vec<Message> {
        open_domain_messages(&self.system_prompt, question)
    }

    pub async fn format(&self, question: &str, records: &[Record]) -> Result<String> {
        self.llm.generate(&self.grounded_prompt(question, records)).await
    }

    pub async fn format_stream(&self, question: &str, records: &[Record]) -> Result<TextStream> {
        self.llm
            .generate_stream(&self.grounded_prompt(question, records))
            .await
    }
}
