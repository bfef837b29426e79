//! Question answering pipeline
//!
//! The [`Orchestrator`] drives one run per question through the
//! [`IntentClassifier`], the graph executor and the [`ResponseFormatter`],
//! degrading to an open-domain answer when the graph has nothing to offer.

mod formatter;
pub mod frame;
mod intent;
mod orchestrator;
pub mod prompts;

pub use formatter::{DEFAULT_MAX_GROUNDING_RECORDS, ResponseFormatter};
pub use frame::{ChatReply, StreamFrame};
pub use intent::{
    FALLBACK_QUERY_TYPE, Intent, IntentAnalysis, IntentClassifier, is_greeting, parse_analysis,
};
pub use orchestrator::{Answer, AnswerSource, AnswerStream, Orchestrator, OrchestratorBuilder};
pub use prompts::{FALLBACK_APOLOGY, FORMAT_APOLOGY, GREETING_ANSWER, load_system_prompt};
