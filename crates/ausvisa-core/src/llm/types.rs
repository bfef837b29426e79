//! Chat-completion wire types
//!
//! Gemini's OpenAI compatibility endpoint and OpenRouter both speak this
//! shape. Only the fields the pipeline reads are modelled; anything a
//! provider omits is defaulted.

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: usize,
    /// Omitted for whole replies
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl<'a> ChatRequest<'a> {
    pub fn new(config: &LlmConfig, model: &'a str, messages: &'a [Message]) -> Self {
        Self {
            model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u32,
}

/// `content` is null when a provider blocks the output
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Text of a finished completion
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    /// Model that produced the text
    pub model: String,
    pub tokens_used: u32,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// First choice's text, or `None` when there is no usable text
    pub fn into_reply(self, requested_model: &str) -> Option<LlmResponse> {
        let tokens_used = self.usage.map(|u| u.total_tokens).unwrap_or(0);
        let model = if self.model.is_empty() {
            requested_model.to_string()
        } else {
            self.model
        };
        let choice = self.choices.into_iter().next()?;
        let content = choice.message.content.filter(|c| !c.trim().is_empty())?;

        Some(LlmResponse {
            content,
            model,
            tokens_used,
            finish_reason: choice.finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_request_omits_stream_unless_set() {
        let config = Config::default().llm;
        let messages = [Message::user("Hello")];

        let whole = serde_json::to_value(ChatRequest::new(&config, "gemini-2.5-flash", &messages))
            .unwrap();
        assert_eq!(whole["model"], "gemini-2.5-flash");
        assert_eq!(whole["messages"][0]["role"], "user");
        assert!(whole.get("stream").is_none());

        let streamed = serde_json::to_value(
            ChatRequest::new(&config, "gemini-2.5-flash", &messages).streaming(),
        )
        .unwrap();
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn test_gemini_style_response() {
        let json = r#"{
            "object": "chat.completion",
            "created": 1734000000,
            "model": "gemini-2.5-flash",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Visa 500 is the Student visa."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let reply = response.into_reply("requested").unwrap();
        assert_eq!(reply.content, "Visa 500 is the Student visa.");
        assert_eq!(reply.model, "gemini-2.5-flash");
        assert_eq!(reply.tokens_used, 19);
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_blocked_content_has_no_reply() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(response.into_reply("gemini-2.5-flash").is_none());
    }

    #[test]
    fn test_missing_model_uses_requested() {
        let json = r#"{"choices": [{"message": {"content": "G'day"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let reply = response.into_reply("gemini-2.0-flash").unwrap();
        assert_eq!(reply.model, "gemini-2.0-flash");
        assert_eq!(reply.tokens_used, 0);
    }
}
