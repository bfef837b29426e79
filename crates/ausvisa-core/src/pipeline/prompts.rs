//! Prompt construction and fixed user-facing texts

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::graph::Record;
use crate::llm::Message;
use crate::templates::ENTITY_SLOTS;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant for Australian visa, study, and settlement information.";

pub const GREETING_ANSWER: &str = "Hello! I can help you with studying in Australia, \
Australian visas and settling in. Try asking something like \"Which universities accept \
IELTS 6.5?\" or \"What is the student visa subclass 500?\"";

/// Shown when formatting grounded records fails
pub const FORMAT_APOLOGY: &str =
    "Sorry, something went wrong while preparing your answer. Please try again.";

/// Shown when the open-domain fallback fails
pub const FALLBACK_APOLOGY: &str =
    "Sorry, I couldn't find matching information. Could you ask a more specific question?";

/// System prompt text from `path`, or the built-in persona
///
/// An unreadable or blank file falls back to [`DEFAULT_SYSTEM_PROMPT`].
pub fn load_system_prompt(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };

    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), "Loaded system prompt");
            text.trim().to_string()
        }
        Ok(_) => {
            warn!(path = %path.display(), "System prompt file is empty, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "System prompt unreadable, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

/// Messages asking the model to classify `question` as a JSON object
pub fn classifier_messages(system_prompt: &str, question: &str, query_types: &[&str]) -> Vec<Message> {
    let instruction = format!(
        r#"Analyze the question below and reply with a single JSON object.

Question: "{question}"

Reply format:
{{
    "intent": "STUDY|VISA|SETTLEMENT|PATHWAY|COMPARE",
    "entities": {{
        "university_name": "...",
        "level": "Bachelor|Master|Doctor",
        "field": "...",
        "exam_type": "IELTS|TOEFL|PTE",
        "max_score": 6.5,
        "subclass": "500",
        "keyword": "..."
    }},
    "query_type": "{query_types}"
}}

Rules:
- Only include entities that appear in the question. Allowed entity keys: {slots}.
- query_type must be one of the listed values, or "fallback" if none fits.
- Reply with JSON only, no explanation."#,
        query_types = query_types.join("|"),
        slots = ENTITY_SLOTS.join(", "),
    );

    vec![Message::system(system_prompt), Message::user(instruction)]
}

/// Messages asking the model to answer from retrieved records
pub fn grounded_messages(system_prompt: &str, question: &str, records: &[Record]) -> Vec<Message> {
    let context = serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string());
    let instruction = format!(
        r#"The user asked: "{question}"

Facts retrieved from the knowledge base:
{context}

Answer the user naturally and warmly:
- Use fitting emoji
- Format nicely with bullets and bold text
- Include every relevant fact
- Suggest a next step
- Include links where available

Do not mention JSON or databases."#
    );

    vec![Message::system(system_prompt), Message::user(instruction)]
}

/// Messages asking the model to answer from general knowledge
pub fn open_domain_messages(system_prompt: &str, question: &str) -> Vec<Message> {
    let instruction = format!(
        r#"The user asked: "{question}"

No exact match was found in the knowledge base.
Answer from your general knowledge about studying, visas and settling in Australia.
Remind the user they can ask a more specific question."#
    );

    vec![Message::system(system_prompt), Message::user(instruction)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_load_system_prompt_default() {
        assert_eq!(load_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(
            load_system_prompt(Some(Path::new("/nonexistent/prompt.txt"))),
            DEFAULT_SYSTEM_PROMPT
        );
    }

    #[test]
    fn test_load_system_prompt_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  You are a migration agent.  ").unwrap();
        assert_eq!(
            load_system_prompt(Some(file.path())),
            "You are a migration agent."
        );
    }

    #[test]
    fn test_blank_system_prompt_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_system_prompt(Some(file.path())), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_classifier_lists_query_types() {
        let messages = classifier_messages("sys", "What is visa 500?", &["visa_info", "settlement_info"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[1].content.contains("visa_info|settlement_info"));
        assert!(messages[1].content.contains("\"What is visa 500?\""));
        assert!(messages[1].content.contains("max_score"));
    }

    #[test]
    fn test_grounded_prompt_embeds_records() {
        let record: Record = json!({"visa_name": "Student visa", "subclass": "500"})
            .as_object()
            .cloned()
            .unwrap();
        let messages = grounded_messages("sys", "q", std::slice::from_ref(&record));
        assert!(messages[1].content.contains("Student visa"));
        assert!(messages[1].content.contains("Do not mention JSON"));
    }

    #[test]
    fn test_open_domain_prompt_has_no_records() {
        let messages = open_domain_messages("sys", "How cold is Hobart?");
        assert!(messages[1].content.contains("How cold is Hobart?"));
        assert!(messages[1].content.contains("general knowledge"));
        assert!(!messages[1].content.contains("Facts retrieved"));
    }
}
