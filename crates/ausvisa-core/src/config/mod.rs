//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// AusVisa configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Bolt address of the Neo4j server
    pub uri: String,
    /// Database the queries are scoped to
    pub database: String,
    pub user: String,
    #[serde(skip)]
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// Size of the driver's connection pool
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for every classifier, executor and formatter call
    pub stage_timeout_secs: u64,
    /// How many records are handed to the formatter as grounding context
    pub max_grounding_records: usize,
    /// Whether front-ends stream answers by default
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                default_model: "gemini-2.5-flash".to_string(),
                fallback_models: vec!["gemini-2.0-flash".to_string()],
                temperature: 0.4,
                max_tokens: 2048,
                timeout_secs: 60,
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            },
            graph: GraphConfig {
                uri: "neo4j://localhost:7687".to_string(),
                database: "neo4j".to_string(),
                user: "neo4j".to_string(),
                password: None,
                timeout_secs: 15,
                max_connections: default_max_connections(),
            },
            cache: CacheConfig {
                enabled: true,
                ttl_secs: 300,
            },
            pipeline: PipelineConfig {
                stage_timeout_secs: 30,
                max_grounding_records: 5,
                streaming: true,
                templates_path: None,
                system_prompt_path: None,
            },
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("AUSVISA_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl GraphConfig {
    /// Password for the graph store, read from `NEO4J_PASSWORD`
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| env::var("NEO4J_PASSWORD").ok())
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        "***".to_string()
    } else {
        format!("***{}", &secret[secret.len() - 4..])
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Invalid boolean value: {}", other)),
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("AUSVISA_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("ausvisa")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration and apply environment overrides on top
    pub fn load_with_env() -> anyhow::Result<Self> {
        let mut config = Self::load()?;
        config.apply_env()?;
        Ok(config)
    }

    /// Apply the recognized environment overrides
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.llm.default_model = model;
        }
        if let Some(ttl) = lookup("CACHE_TTL") {
            self.cache.ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("Invalid CACHE_TTL value: {}", ttl))?;
        }
        if let Some(streaming) = lookup("ENABLE_STREAMING") {
            self.pipeline.streaming = parse_bool(&streaming)?;
        }
        if let Some(uri) = lookup("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.graph.database = database;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.graph.user = user;
        }
        if let Some(path) = lookup("AUSVISA_TEMPLATES") {
            self.pipeline.templates_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("AUSVISA_SYSTEM_PROMPT") {
            self.pipeline.system_prompt_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.graph.password.is_some() {
            return Err(anyhow!(
                "Graph store passwords must be provided via NEO4J_PASSWORD, not stored in configuration"
            ));
        }
        if self.graph.max_connections == 0 {
            return Err(anyhow!("graph.max_connections must be at least 1"));
        }
        if self.pipeline.max_grounding_records == 0 {
            return Err(anyhow!("pipeline.max_grounding_records must be at least 1"));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(anyhow!("pipeline.stage_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "llm.default_model" => Ok(self.llm.default_model.clone()),
            "llm.fallback_models" => Ok(self.llm.fallback_models.join(", ")),
            "llm.temperature" => Ok(self.llm.temperature.to_string()),
            "llm.max_tokens" => Ok(self.llm.max_tokens.to_string()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),
            "llm.base_url" => Ok(self.llm.base_url.clone()),

            "graph.uri" => Ok(self.graph.uri.clone()),
            "graph.database" => Ok(self.graph.database.clone()),
            "graph.user" => Ok(self.graph.user.clone()),
            "graph.timeout_secs" => Ok(self.graph.timeout_secs.to_string()),
            "graph.max_connections" => Ok(self.graph.max_connections.to_string()),

            "cache.enabled" => Ok(self.cache.enabled.to_string()),
            "cache.ttl_secs" => Ok(self.cache.ttl_secs.to_string()),

            "pipeline.stage_timeout_secs" => Ok(self.pipeline.stage_timeout_secs.to_string()),
            "pipeline.max_grounding_records" => {
                Ok(self.pipeline.max_grounding_records.to_string())
            }
            "pipeline.streaming" => Ok(self.pipeline.streaming.to_string()),
            "pipeline.templates_path" => Ok(self
                .pipeline
                .templates_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in defaults)".to_string())),
            "pipeline.system_prompt_path" => Ok(self
                .pipeline
                .system_prompt_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in prompt)".to_string())),

            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok(
                    "(not set - use AUSVISA_API_KEY or GOOGLE_API_KEY env var)".to_string(),
                ),
            },
            "graph.password" => Ok(match self.graph.resolved_password() {
                Some(password) => redact(&password),
                None => "(not set - use NEO4J_PASSWORD env var)".to_string(),
            }),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `ausvisa config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "llm.default_model" => {
                self.llm.default_model = value.to_string();
            }
            "llm.fallback_models" => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "llm.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.llm.temperature = temp;
            }
            "llm.max_tokens" => {
                self.llm.max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid max_tokens value: {}", value))?;
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "llm.base_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(anyhow!("llm.base_url must be an http(s) URL"));
                }
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }

            "graph.uri" => {
                const SCHEMES: [&str; 6] = [
                    "neo4j://",
                    "neo4j+s://",
                    "neo4j+ssc://",
                    "bolt://",
                    "bolt+s://",
                    "bolt+ssc://",
                ];
                if !SCHEMES.iter().any(|scheme| value.starts_with(scheme)) {
                    return Err(anyhow!(
                        "graph.uri must be a Bolt address (neo4j://, neo4j+s://, bolt://, ...)"
                    ));
                }
                self.graph.uri = value.trim_end_matches('/').to_string();
            }
            "graph.database" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("graph.database cannot be empty"));
                }
                self.graph.database = value.trim().to_string();
            }
            "graph.user" => {
                self.graph.user = value.to_string();
            }
            "graph.timeout_secs" => {
                self.graph.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "graph.max_connections" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("graph.max_connections must be at least 1"));
                }
                self.graph.max_connections = max;
            }

            "cache.enabled" => {
                self.cache.enabled = parse_bool(value)?;
            }
            "cache.ttl_secs" => {
                self.cache.ttl_secs = value
                    .parse()
                    .with_context(|| format!("Invalid ttl_secs value: {}", value))?;
            }

            "pipeline.stage_timeout_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid stage_timeout_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("Stage timeout must be at least 1 second"));
                }
                self.pipeline.stage_timeout_secs = secs;
            }
            "pipeline.max_grounding_records" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_grounding_records value: {}", value))?;
                if !(1..=50).contains(&max) {
                    return Err(anyhow!("max_grounding_records must be between 1 and 50"));
                }
                self.pipeline.max_grounding_records = max;
            }
            "pipeline.streaming" => {
                self.pipeline.streaming = parse_bool(value)?;
            }
            "pipeline.templates_path" => {
                self.pipeline.templates_path = Some(PathBuf::from(value));
            }
            "pipeline.system_prompt_path" => {
                self.pipeline.system_prompt_path = Some(PathBuf::from(value));
            }

            "llm.api_key" | "api_key" | "graph.password" => {
                return Err(anyhow!(
                    "Secrets cannot be stored in configuration. \
                     Set AUSVISA_API_KEY (or GOOGLE_API_KEY) and NEO4J_PASSWORD environment variables instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `ausvisa config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.default_model",
            "llm.fallback_models",
            "llm.temperature",
            "llm.max_tokens",
            "llm.timeout_secs",
            "llm.base_url",
            "llm.api_key",
            "graph.uri",
            "graph.database",
            "graph.user",
            "graph.password",
            "graph.timeout_secs",
            "graph.max_connections",
            "cache.enabled",
            "cache.ttl_secs",
            "pipeline.stage_timeout_secs",
            "pipeline.max_grounding_records",
            "pipeline.streaming",
            "pipeline.templates_path",
            "pipeline.system_prompt_path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
