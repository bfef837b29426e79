//! End-to-end runs over the production adapters

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ausvisa_core::cache::TtlCache;
use ausvisa_core::config::Config;
use ausvisa_core::graph::{MemoryGraph, Neo4jStore};
use ausvisa_core::llm::LlmClient;
use ausvisa_core::pipeline::{AnswerSource, Intent, Orchestrator};
use ausvisa_core::templates::{DefaultQuery, TemplateRegistry, TemplateSource};

fn shipped_templates() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../queries/templates.cypher")
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-e2e",
        "model": "gemini-2.5-flash",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 20, "total_tokens": 60}
    })
}

#[test]
fn test_shipped_template_file_loads() {
    let registry = TemplateRegistry::load_strict(&shipped_templates()).unwrap();

    assert!(matches!(registry.source(), TemplateSource::File(_)));
    for query in DefaultQuery::ALL {
        assert!(
            registry.contains(query.as_str()),
            "shipped file lacks {}",
            query
        );
    }
    for name in ["visa_steps", "settlement_for_visa", "comprehensive_pathway"] {
        assert!(registry.contains(name), "shipped file lacks {}", name);
    }

    let visa = registry.get("visa_info").unwrap();
    assert!(visa.parameters.contains("subclass"));
    assert!(visa.body.starts_with("MATCH"));
}

#[tokio::test]
async fn test_visa_question_end_to_end() {
    let llm_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Reply with JSON only"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"intent\": \"VISA\", \"entities\": {\"visa_subclass\": \"500\"}, \"query_type\": \"visa_info\"}\n```",
        )))
        .expect(1)
        .mount(&llm_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Facts retrieved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "The **Student visa (subclass 500)** lets you study full-time in Australia.",
        )))
        .expect(1)
        .mount(&llm_server)
        .await;

    let graph = MemoryGraph::new().with_result(
        "HAS_ABOUT_INFO",
        vec![
            json!({
                "visa_name": "Student visa",
                "subclass": "500",
                "about_information": [{"field": "Overview", "content": "Stay in Australia to study full-time."}]
            })
            .as_object()
            .cloned()
            .unwrap(),
        ],
    );

    let mut config = Config::default();
    config.llm.base_url = llm_server.uri();
    config.llm.fallback_models.clear();

    let orchestrator = Orchestrator::builder()
        .language_model(Arc::new(LlmClient::new(config.llm.clone(), "e2e-key").unwrap()))
        .graph_store(Arc::new(graph.clone()))
        .templates(TemplateRegistry::load(Some(&shipped_templates())))
        .cache(Arc::new(TtlCache::new(Duration::from_secs(300))))
        .build()
        .unwrap();

    let answer = orchestrator.answer("What is visa 500?").await;
    assert_eq!(answer.source, AnswerSource::Grounded);
    assert_eq!(answer.intent, Some(Intent::Visa));
    assert!(answer.response.contains("subclass 500"));

    let queries = graph.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].params.get("subclass"), Some(&json!("500")));

    // Served from cache: the mocks above expect exactly one call each
    let again = orchestrator.answer("what is visa 500?").await;
    assert_eq!(again.source, AnswerSource::Cache);
    assert_eq!(again.response, answer.response);
    assert_eq!(graph.queries().len(), 1);
}

#[tokio::test]
async fn test_unreachable_services_still_answer() {
    let llm_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&llm_server)
        .await;

    let mut config = Config::default();
    config.llm.base_url = llm_server.uri();
    config.llm.fallback_models.clear();
    // Nothing listens on the discard port
    config.graph.uri = "127.0.0.1:9".to_string();
    config.graph.timeout_secs = 5;

    let orchestrator = Orchestrator::builder()
        .language_model(Arc::new(LlmClient::new(config.llm.clone(), "e2e-key").unwrap()))
        .graph_store(Arc::new(Neo4jStore::with_password(&config.graph, None)))
        .build()
        .unwrap();

    let answer = orchestrator.answer("Which universities offer nursing?").await;
    assert_eq!(answer.source, AnswerSource::Apology);
    assert!(!answer.response.contains("unavailable"));
}
