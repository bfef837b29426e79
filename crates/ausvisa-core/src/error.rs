//! Error types for AusVisa

use thiserror::Error;

/// Result type alias using AusVisa's Error
pub type Result<T> = std::result::Result<T, Error>;

/// AusVisa error types with helpful messages and suggestions
///
/// None of these messages is ever shown to a person asking a question; the
/// pipeline converts every variant into a degraded value or a fixed apology.
/// They surface in logs and in the operator-facing CLI commands.
#[derive(Error, Debug)]
pub enum Error {
    // Language model errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `ausvisa doctor`.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("No suitable model found: {0}")]
    NoSuitableModel(String),

    // Graph store errors (E200-E299)
    #[error("Graph store error: {0}")]
    GraphStoreError(String),

    #[error("Graph store rejected credentials for user '{0}'. Check NEO4J_USER and NEO4J_PASSWORD.")]
    GraphUnauthorized(String),

    // Template errors (E300-E399)
    #[error("Query type '{0}' is not registered. Run `ausvisa templates list` to see all query types.")]
    UnknownQueryType(String),

    #[error("Query '{query_type}' is missing parameters: {}", missing.join(", "))]
    MissingParameters {
        query_type: String,
        missing: Vec<String>,
    },

    #[error("Template error: {0}")]
    TemplateError(String),

    // Pipeline errors (E400-E499)
    #[error("{stage} timed out after {secs} seconds")]
    Timeout { stage: &'static str, secs: u64 },

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::MalformedOutput(_) => "E103",
            Self::NoSuitableModel(_) => "E104",
            Self::GraphStoreError(_) => "E200",
            Self::GraphUnauthorized(_) => "E201",
            Self::UnknownQueryType(_) => "E300",
            Self::MissingParameters { .. } => "E301",
            Self::TemplateError(_) => "E302",
            Self::Timeout { .. } => "E400",
            Self::ConfigError(_) => "E600",
            Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("ausvisa doctor".to_string()),
            Self::GraphStoreError(_) => Some("ausvisa doctor".to_string()),
            Self::GraphUnauthorized(_) => {
                Some("export NEO4J_USER=<user> NEO4J_PASSWORD=<password>".to_string())
            }
            Self::UnknownQueryType(_) => Some("ausvisa templates list".to_string()),
            Self::Timeout { .. } => {
                Some("ausvisa config set pipeline.stage_timeout_secs <secs>".to_string())
            }
            _ => None,
        }
    }

    /// Whether this failure came from a stage exceeding its time budget
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
