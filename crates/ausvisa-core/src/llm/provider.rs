//! The language-model capability consumed by the pipeline
//!
//! The pipeline never talks to an HTTP client directly; it sees a model as
//! something that turns messages into text, whole or incrementally. Output is
//! untrusted and every caller validates it.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::Result;

use super::types::Message;

/// A lazy, finite, forward-only sequence of text chunks
///
/// Dropping the stream abandons the underlying call and releases its
/// resources. Consumers that need the whole text concatenate chunks in
/// arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A model that can answer a prompt in one shot or as a stream
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the complete reply for `messages`
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Start generating the reply for `messages` as a chunk stream
    ///
    /// An error here means the call could not be started; failures after the
    /// first chunk arrive as `Err` items in the stream.
    async fn generate_stream(&self, messages: &[Message]) -> Result<TextStream>;

    /// Identifier of the model used by default, for logs
    fn model_name(&self) -> &str;
}
