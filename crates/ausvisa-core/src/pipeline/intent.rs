//! Intent classification
//!
//! Turns a question into an [`IntentAnalysis`]: a domain intent, the entities
//! found in the question and the query type to run. Model output is treated as
//! untrusted text and validated before use.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::Params;
use crate::llm::LanguageModel;
use crate::templates::{ENTITY_SLOTS, TemplateRegistry};

use super::prompts::classifier_messages;

/// Query type used when nothing registered fits
pub const FALLBACK_QUERY_TYPE: &str = "fallback";

const GREETINGS: [&str; 11] = [
    "hi",
    "hello",
    "hey",
    "hi there",
    "hello there",
    "good morning",
    "good afternoon",
    "good evening",
    "chào",
    "xin chào",
    "chào bạn",
];

/// Entity keys models commonly emit in place of the canonical slot
const ENTITY_ALIASES: [(&str, &str); 3] = [
    ("visa_subclass", "subclass"),
    ("score", "max_score"),
    ("university", "university_name"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    #[default]
    Study,
    Visa,
    Settlement,
    Pathway,
    Compare,
    Greeting,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "STUDY",
            Self::Visa => "VISA",
            Self::Settlement => "SETTLEMENT",
            Self::Pathway => "PATHWAY",
            Self::Compare => "COMPARE",
            Self::Greeting => "GREETING",
        }
    }

    /// Parse a label, mapping anything unrecognized to the default
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "STUDY" => Self::Study,
            "VISA" => Self::Visa,
            "SETTLEMENT" => Self::Settlement,
            "PATHWAY" => Self::Pathway,
            "COMPARE" => Self::Compare,
            "GREETING" => Self::Greeting,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub entities: Params,
    pub query_type: String,
}

impl IntentAnalysis {
    pub fn greeting() -> Self {
        Self {
            intent: Intent::Greeting,
            entities: Params::new(),
            query_type: FALLBACK_QUERY_TYPE.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.query_type == FALLBACK_QUERY_TYPE
    }
}

impl Default for IntentAnalysis {
    fn default() -> Self {
        Self {
            intent: Intent::default(),
            entities: Params::new(),
            query_type: FALLBACK_QUERY_TYPE.to_string(),
        }
    }
}

/// Whether `question` is a bare greeting
///
/// Case-insensitive; trailing `!`, `.`, `?` and `,` are ignored.
pub fn is_greeting(question: &str) -> bool {
    let lowered = question.trim().to_lowercase();
    let stripped = lowered
        .trim_end_matches(['!', '.', '?', ','])
        .trim_end();
    GREETINGS.contains(&stripped)
}

/// Classifies questions with a language model
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    system_prompt: Arc<str>,
    query_types: Vec<String>,
}

impl IntentClassifier {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        system_prompt: impl Into<Arc<str>>,
        registry: &TemplateRegistry,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            query_types: registry.names().into_iter().map(str::to_string).collect(),
        }
    }

    pub async fn try_classify(&self, question: &str) -> Result<IntentAnalysis> {
        if is_greeting(question) {
            return Ok(IntentAnalysis::greeting());
        }

        let query_types: Vec<&str> = self.query_types.iter().map(String::as_str).collect();
        let messages = classifier_messages(&self.system_prompt, question, &query_types);
        let reply = self.llm.generate(&messages).await?;

        let analysis = parse_analysis(&reply)?;
        debug!(
            intent = %analysis.intent,
            query_type = %analysis.query_type,
            entities = analysis.entities.len(),
            "Classified question"
        );
        Ok(analysis)
    }

    /// Like [`Self::try_classify`], degrading every failure to the default analysis
    pub async fn classify(&self, question: &str) -> IntentAnalysis {
        match self.try_classify(question).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, code = e.code(), "Intent classification failed");
                IntentAnalysis::default()
            }
        }
    }
}

/// Parse a model reply into an analysis
///
/// Code fences are stripped and the outermost `{...}` is taken, so a reply
/// wrapped in prose still parses.
pub fn parse_analysis(reply: &str) -> Result<IntentAnalysis> {
    let text = extract_json_object(reply)
        .ok_or_else(|| Error::MalformedOutput("reply contains no JSON object".to_string()))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedOutput(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::MalformedOutput("reply is not a JSON object".to_string()))?;

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::from_label)
        .unwrap_or_default();

    let entities = object
        .get("entities")
        .and_then(Value::as_object)
        .map(|raw| {
            raw.iter()
                .filter_map(|(key, value)| {
                    let slot = canonical_slot(key)?;
                    Some((slot.to_string(), scalar(value)?))
                })
                .collect()
        })
        .unwrap_or_default();

    let query_type = object
        .get("query_type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_QUERY_TYPE)
        .to_string();

    Ok(IntentAnalysis {
        intent,
        entities,
        query_type,
    })
}

fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn canonical_slot(key: &str) -> Option<&'static str> {
    let key = key.trim();
    let key = ENTITY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, slot)| *slot)
        .unwrap_or(key);
    ENTITY_SLOTS.iter().copied().find(|slot| *slot == key)
}

/// Keep strings, numbers and booleans; drop nulls, empties and containers
fn scalar(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        }
        Value::Number(_) | Value::Bool(_) => Some(value.clone()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
