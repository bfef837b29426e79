//! AusVisa Core Library
//!
//! This crate answers questions about studying, visas and settling in
//! Australia from a knowledge graph, including:
//! - Query templates (load-once registry of parameterized Cypher)
//! - Graph access (Neo4j over Bolt, pooled)
//! - LLM integration (OpenAI-compatible, Gemini by default)
//! - Intent classification and answer formatting
//! - Response caching with a fixed TTL
//! - The orchestrator tying the stages together, whole or streamed

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod templates;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{Answer, AnswerSource, Orchestrator};
}

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod graph_tests;
