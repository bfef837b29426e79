//! Server-Sent Events parsing for streamed chat completions

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One `data:` event of a streamed completion
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }

    /// Set on the last chunk of a choice
    pub fn is_done(&self) -> bool {
        self.finish_reason().is_some()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

/// Event from streaming response parsing
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    /// The `[DONE]` terminator
    Done,
    /// A `data:` line that did not parse
    Error(String),
}

/// Parse a Server-Sent Events line into a StreamEvent
///
/// Accepts both `data: {...}` and `data:{...}`; blank lines, comments and
/// non-data fields yield `None`.
pub fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();

    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(StreamEvent::Chunk(chunk)),
        Err(e) => Some(StreamEvent::Error(format!("Failed to parse chunk: {}", e))),
    }
}

/// Incremental line splitter for an SSE byte stream
///
/// Network reads split lines, and multi-byte characters, anywhere. Bytes are
/// buffered raw and only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and drain every complete line as parsed events
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest);
        if rest.trim().is_empty() {
            None
        } else {
            parse_sse_line(&rest)
        }
    }
}
