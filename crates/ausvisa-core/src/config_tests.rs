//! Config module tests

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.llm.default_model, "gemini-2.5-flash");
    assert_eq!(config.graph.uri, "neo4j://localhost:7687");
    assert_eq!(config.graph.max_connections, 8);
    assert_eq!(config.graph.database, "neo4j");
    assert_eq!(config.cache.ttl_secs, 300);
    assert!(config.cache.enabled);
    assert_eq!(config.pipeline.max_grounding_records, 5);
    assert!(config.pipeline.streaming);
    assert!(config.validate().is_ok());
}

#[test]
fn test_env_overrides() {
    let mut config = Config::default();
    config
        .apply_overrides(lookup(&[
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("CACHE_TTL", " 60 "),
            ("ENABLE_STREAMING", "false"),
            ("NEO4J_URI", "neo4j+s://graph.internal:7687"),
            ("NEO4J_DATABASE", "ausvisa"),
            ("NEO4J_USER", "reader"),
            ("AUSVISA_TEMPLATES", "/etc/ausvisa/templates.cypher"),
        ]))
        .unwrap();

    assert_eq!(config.llm.default_model, "gemini-2.0-flash");
    assert_eq!(config.cache.ttl_secs, 60);
    assert!(!config.pipeline.streaming);
    assert_eq!(config.graph.uri, "neo4j+s://graph.internal:7687");
    assert_eq!(config.graph.database, "ausvisa");
    assert_eq!(config.graph.user, "reader");
    assert_eq!(
        config.pipeline.templates_path,
        Some(PathBuf::from("/etc/ausvisa/templates.cypher"))
    );
    assert!(config.pipeline.system_prompt_path.is_none());
}

#[test]
fn test_invalid_env_override() {
    let mut config = Config::default();
    assert!(config.apply_overrides(lookup(&[("CACHE_TTL", "five minutes")])).is_err());
    assert!(config.apply_overrides(lookup(&[("ENABLE_STREAMING", "maybe")])).is_err());
}

#[test]
fn test_set_and_get() {
    let mut config = Config::default();
    config.set("cache.ttl_secs", "120").unwrap();
    config.set("llm.fallback_models", "a, b,,c").unwrap();
    config.set("graph.uri", "neo4j+s://abc123.databases.neo4j.io/").unwrap();
    config.set("graph.max_connections", "16").unwrap();
    config.set("pipeline.streaming", "off").unwrap();

    assert_eq!(config.get("cache.ttl_secs").unwrap(), "120");
    assert_eq!(config.get("llm.fallback_models").unwrap(), "a, b, c");
    assert_eq!(
        config.get("graph.uri").unwrap(),
        "neo4j+s://abc123.databases.neo4j.io"
    );
    assert_eq!(config.get("graph.max_connections").unwrap(), "16");
    assert_eq!(config.get("pipeline.streaming").unwrap(), "false");
}

#[test]
fn test_set_rejects_bad_values() {
    let mut config = Config::default();
    assert!(config.set("llm.temperature", "3.5").is_err());
    assert!(config.set("graph.uri", "http://localhost:7474").is_err());
    assert!(config.set("graph.max_connections", "0").is_err());
    assert!(config.set("pipeline.stage_timeout_secs", "0").is_err());
    assert!(config.set("pipeline.max_grounding_records", "0").is_err());
    assert!(config.set("graph.database", "  ").is_err());
    assert!(config.set("no.such.key", "1").is_err());
}

#[test]
fn test_secrets_are_env_only() {
    let mut config = Config::default();
    assert!(config.set("llm.api_key", "sk-test").is_err());
    assert!(config.set("graph.password", "hunter2").is_err());

    config.llm.api_key = Some("sk-test".to_string());
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.graph.password = Some("hunter2".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_list_covers_every_section() {
    let entries = Config::default().list().unwrap();
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    for prefix in ["llm.", "graph.", "cache.", "pipeline."] {
        assert!(keys.iter().any(|k| k.starts_with(prefix)), "missing {prefix}");
    }
    assert!(keys.contains(&"pipeline.templates_path"));
}

#[test]
fn test_toml_round_trip_skips_secrets() {
    let mut config = Config::default();
    config.graph.password = Some("hunter2".to_string());
    config.pipeline.templates_path = Some(PathBuf::from("queries/templates.cypher"));

    let text = toml::to_string_pretty(&config).unwrap();
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("api_key"));

    let parsed: Config = toml::from_str(&text).unwrap();
    assert!(parsed.graph.password.is_none());
    assert_eq!(
        parsed.pipeline.templates_path,
        Some(PathBuf::from("queries/templates.cypher"))
    );
}

#[test]
fn test_durations() {
    let config = Config::default();
    assert_eq!(config.cache.ttl().as_secs(), 300);
    assert_eq!(config.pipeline.stage_timeout().as_secs(), 30);
}
