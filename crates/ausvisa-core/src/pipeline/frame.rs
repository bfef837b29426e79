//! Transport framing for answers
//!
//! Whole answers serialize as [`ChatReply`]. Streamed answers are a run of
//! [`StreamFrame::Chunk`] events closed by a distinct [`StreamFrame::End`], so
//! an empty chunk is never mistaken for the end of the stream.

use serde::{Deserialize, Serialize};

use super::orchestrator::Answer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub intent: Option<String>,
}

impl From<&Answer> for ChatReply {
    fn from(answer: &Answer) -> Self {
        Self {
            response: answer.response.clone(),
            intent: answer.intent.map(|i| i.as_str().to_string()),
        }
    }
}

impl From<Answer> for ChatReply {
    fn from(answer: Answer) -> Self {
        Self {
            intent: answer.intent.map(|i| i.as_str().to_string()),
            response: answer.response,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Chunk(String),
    End,
}

#[derive(Serialize)]
struct ChunkPayload<'a> {
    chunk: &'a str,
}

impl StreamFrame {
    /// Server-sent event encoding of this frame
    pub fn to_sse(&self) -> String {
        match self {
            Self::Chunk(text) => {
                let payload = serde_json::to_string(&ChunkPayload { chunk: text })
                    .unwrap_or_else(|_| "{\"chunk\":\"\"}".to_string());
                format!("data: {}\n\n", payload)
            }
            Self::End => "data: [DONE]\n\n".to_string(),
        }
    }
}
