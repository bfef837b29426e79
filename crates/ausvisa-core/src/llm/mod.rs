//! Language model integration
//!
//! This module provides:
//! - The [`LanguageModel`] capability the pipeline is written against
//! - An OpenAI-compatible HTTP client (Gemini compatibility endpoint by default)
//! - Model fallback with automatic retry
//! - Streaming response support

mod client;
mod provider;
mod streaming;
mod types;

pub use client::LlmClient;
pub use provider::{LanguageModel, TextStream};
pub use streaming::{SseLineBuffer, StreamChunk, StreamEvent, parse_sse_line};
pub use types::{ChatRequest, ChatResponse, LlmResponse, Message, MessageRole};
