//! Per-question pipeline
//!
//! greeting -> cache -> classify -> execute -> format (grounded or open-domain)
//! -> cache write. Every stage is bounded by the stage timeout and every
//! failure degrades to the stage's default value; only fixed apology texts
//! ever reach the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{AnswerCache, NoCache, TtlCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{GraphQueryExecutor, GraphStore, Neo4jStore, Record};
use crate::llm::{LanguageModel, LlmClient};
use crate::templates::TemplateRegistry;

use super::formatter::{DEFAULT_MAX_GROUNDING_RECORDS, ResponseFormatter};
use super::intent::{Intent, IntentAnalysis, IntentClassifier, is_greeting};
use super::prompts::{
    DEFAULT_SYSTEM_PROMPT, FALLBACK_APOLOGY, FORMAT_APOLOGY, GREETING_ANSWER, load_system_prompt,
};

/// Chunks buffered between the producer task and the consumer
const STREAM_BUFFER: usize = 32;

/// How often a finished producer checks whether the consumer caught up
const DRAIN_POLL: Duration = Duration::from_millis(5);

const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Route a run took to produce its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Greeting,
    Cache,
    Grounded,
    OpenDomain,
    Apology,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub response: String,
    /// Classified intent; `None` when served from cache
    pub intent: Option<Intent>,
    pub source: AnswerSource,
}

impl Answer {
    fn greeting() -> Self {
        Self {
            response: GREETING_ANSWER.to_string(),
            intent: Some(Intent::Greeting),
            source: AnswerSource::Greeting,
        }
    }
}

/// Which generation branch a run is on
#[derive(Debug, Clone, Copy)]
enum Branch {
    Grounded,
    OpenDomain,
}

impl Branch {
    fn stage(self) -> &'static str {
        match self {
            Self::Grounded => "format",
            Self::OpenDomain => "fallback",
        }
    }

    fn apology(self) -> &'static str {
        match self {
            Self::Grounded => FORMAT_APOLOGY,
            Self::OpenDomain => FALLBACK_APOLOGY,
        }
    }

    fn source(self) -> AnswerSource {
        match self {
            Self::Grounded => AnswerSource::Grounded,
            Self::OpenDomain => AnswerSource::OpenDomain,
        }
    }
}

/// Answers questions end to end
///
/// Cheap to clone; every clone shares the same model, store and cache.
#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LanguageModel>,
    classifier: IntentClassifier,
    executor: GraphQueryExecutor,
    formatter: ResponseFormatter,
    cache: Arc<dyn AnswerCache>,
    stage_timeout: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Wire the production adapters from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .llm
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .ok_or_else(|| {
                Error::ConfigError(
                    "no API key found; set AUSVISA_API_KEY or GOOGLE_API_KEY".to_string(),
                )
            })?;

        let llm = LlmClient::new(config.llm.clone(), api_key)?;
        let store = Neo4jStore::new(&config.graph);
        let registry = TemplateRegistry::load(config.pipeline.templates_path.as_deref());
        let cache: Arc<dyn AnswerCache> = if config.cache.enabled {
            Arc::new(TtlCache::new(config.cache.ttl()))
        } else {
            Arc::new(NoCache)
        };

        Self::builder()
            .language_model(Arc::new(llm))
            .graph_store(Arc::new(store))
            .templates(registry)
            .cache(cache)
            .system_prompt(load_system_prompt(
                config.pipeline.system_prompt_path.as_deref(),
            ))
            .stage_timeout(config.pipeline.stage_timeout())
            .max_grounding_records(config.pipeline.max_grounding_records)
            .build()
    }

    pub fn executor(&self) -> &GraphQueryExecutor {
        &self.executor
    }

    pub fn registry(&self) -> &TemplateRegistry {
        self.executor.registry()
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Answer `question` in one piece
    pub async fn answer(&self, question: &str) -> Answer {
        let span = info_span!("answer", request_id = %Uuid::new_v4(), streaming = false);
        self.answer_whole(question).instrument(span).await
    }

    /// Answer `question` as a stream of text chunks
    ///
    /// Generation runs on a spawned task. Dropping the returned stream cancels
    /// it, and an answer that was not streamed to completion is never cached.
    pub fn answer_stream(&self, question: &str) -> AnswerStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let this = self.clone();
        let question = question.to_string();
        let span = info_span!("answer", request_id = %Uuid::new_v4(), streaming = true);

        tokio::spawn(
            async move {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Answer stream dropped by consumer");
                    }
                    _ = this.produce(&question, &tx) => {}
                }
            }
            .instrument(span),
        );

        AnswerStream {
            rx,
            _guard: token.drop_guard(),
        }
    }

    async fn answer_whole(&self, question: &str) -> Answer {
        if is_greeting(question) {
            return Answer::greeting();
        }

        if let Some(cached) = self.cache.get(question) {
            debug!("Serving cached answer");
            return Answer {
                response: cached,
                intent: None,
                source: AnswerSource::Cache,
            };
        }

        let analysis = self.analyze(question).await;
        if analysis.intent == Intent::Greeting {
            debug!("Classifier labelled the question a greeting");
            return Answer::greeting();
        }
        let records = self.retrieve(&analysis).await;
        let branch = branch_for(&records);

        let generated = match branch {
            Branch::Grounded => {
                self.bounded(branch.stage(), self.formatter.format(question, &records))
                    .await
            }
            Branch::OpenDomain => {
                let messages = self.formatter.open_domain(question);
                self.bounded(branch.stage(), self.llm.generate(&messages))
                    .await
            }
        };

        match generated.and_then(non_empty) {
            Ok(text) => {
                self.cache.put(question, &text);
                info!(intent = %analysis.intent, source = ?branch.source(), "Answered question");
                Answer {
                    response: text,
                    intent: Some(analysis.intent),
                    source: branch.source(),
                }
            }
            Err(e) => {
                log_degraded(branch.stage(), &e);
                Answer {
                    response: branch.apology().to_string(),
                    intent: Some(analysis.intent),
                    source: AnswerSource::Apology,
                }
            }
        }
    }

    /// Streaming run; returns early once the consumer is gone
    async fn produce(&self, question: &str, tx: &mpsc::Sender<String>) {
        if is_greeting(question) {
            let _ = tx.send(GREETING_ANSWER.to_string()).await;
            return;
        }

        if let Some(cached) = self.cache.get(question) {
            debug!("Serving cached answer");
            let _ = tx.send(cached).await;
            return;
        }

        let analysis = self.analyze(question).await;
        if analysis.intent == Intent::Greeting {
            debug!("Classifier labelled the question a greeting");
            let _ = tx.send(GREETING_ANSWER.to_string()).await;
            return;
        }
        let records = self.retrieve(&analysis).await;
        let branch = branch_for(&records);

        let opened = match branch {
            Branch::Grounded => {
                self.bounded(branch.stage(), self.formatter.format_stream(question, &records))
                    .await
            }
            Branch::OpenDomain => {
                let messages = self.formatter.open_domain(question);
                self.bounded(branch.stage(), self.llm.generate_stream(&messages))
                    .await
            }
        };

        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => {
                log_degraded(branch.stage(), &e);
                let _ = tx.send(branch.apology().to_string()).await;
                return;
            }
        };

        let mut full = String::new();
        loop {
            let next = match tokio::time::timeout(self.stage_timeout, chunks.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(self.timeout_error(branch.stage()))),
            };

            match next {
                None => break,
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    full.push_str(&chunk);
                    if tx.send(chunk).await.is_err() {
                        debug!("Answer stream receiver closed");
                        return;
                    }
                }
                Some(Err(e)) => {
                    log_degraded(branch.stage(), &e);
                    let apology = if full.is_empty() {
                        branch.apology().to_string()
                    } else {
                        format!("\n\n{}", branch.apology())
                    };
                    let _ = tx.send(apology).await;
                    return;
                }
            }
        }

        if full.trim().is_empty() {
            log_degraded(
                branch.stage(),
                &Error::MalformedOutput("model streamed no text".to_string()),
            );
            let _ = tx.send(branch.apology().to_string()).await;
            return;
        }

        if !self.drained(tx).await {
            debug!("Consumer did not read the whole answer, not caching");
            return;
        }
        self.cache.put(question, &full);
        info!(intent = %analysis.intent, source = ?branch.source(), "Streamed answer");
    }

    /// Wait until every sent chunk has been received
    ///
    /// A consumer that drops the stream cancels this task outright; one that
    /// stalls gets a stage timeout before the answer is written off.
    async fn drained(&self, tx: &mpsc::Sender<String>) -> bool {
        let caught_up = async {
            while tx.capacity() < tx.max_capacity() {
                if tx.is_closed() {
                    return false;
                }
                tokio::time::sleep(DRAIN_POLL).await;
            }
            true
        };
        tokio::time::timeout(self.stage_timeout, caught_up)
            .await
            .unwrap_or(false)
    }

    async fn analyze(&self, question: &str) -> IntentAnalysis {
        match self
            .bounded("classify", self.classifier.try_classify(question))
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                log_degraded("classify", &e);
                IntentAnalysis::default()
            }
        }
    }

    async fn retrieve(&self, analysis: &IntentAnalysis) -> Vec<Record> {
        let query = self
            .executor
            .try_execute(&analysis.query_type, &analysis.entities);
        match self.bounded("execute", query).await {
            Ok(records) => records,
            Err(e) => {
                log_degraded("execute", &e);
                Vec::new()
            }
        }
    }

    async fn bounded<T>(&self, stage: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.stage_timeout, fut)
            .await
            .unwrap_or_else(|_| Err(self.timeout_error(stage)))
    }

    fn timeout_error(&self, stage: &'static str) -> Error {
        Error::Timeout {
            stage,
            secs: self.stage_timeout.as_secs(),
        }
    }
}

fn branch_for(records: &[Record]) -> Branch {
    if records.is_empty() {
        Branch::OpenDomain
    } else {
        Branch::Grounded
    }
}

fn non_empty(text: String) -> Result<String> {
    if text.trim().is_empty() {
        Err(Error::MalformedOutput("model returned no text".to_string()))
    } else {
        Ok(text)
    }
}

fn log_degraded(stage: &'static str, error: &Error) {
    match error {
        Error::Timeout { .. } => warn!(stage, error = %error, "Stage timed out, degrading"),
        Error::UnknownQueryType(query_type) => {
            debug!(stage, query_type = %query_type, "No template for query type, degrading")
        }
        _ => warn!(stage, error = %error, code = error.code(), "Stage failed, degrading"),
    }
}

/// Chunks of a streamed answer, in arrival order
///
/// Dropping it cancels the run that feeds it.
pub struct AnswerStream {
    rx: mpsc::Receiver<String>,
    _guard: DropGuard,
}

impl AnswerStream {
    /// Drain the stream into one string
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.rx.recv().await {
            text.push_str(&chunk);
        }
        text
    }
}

impl Stream for AnswerStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Assembles an [`Orchestrator`] from its parts
pub struct OrchestratorBuilder {
    llm: Option<Arc<dyn LanguageModel>>,
    store: Option<Arc<dyn GraphStore>>,
    registry: Option<TemplateRegistry>,
    cache: Option<Arc<dyn AnswerCache>>,
    system_prompt: Option<String>,
    stage_timeout: Duration,
    max_grounding_records: usize,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            llm: None,
            store: None,
            registry: None,
            cache: None,
            system_prompt: None,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            max_grounding_records: DEFAULT_MAX_GROUNDING_RECORDS,
        }
    }
}

impl OrchestratorBuilder {
    pub fn language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn templates(mut self, registry: TemplateRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Defaults to [`NoCache`]
    pub fn cache(mut self, cache: Arc<dyn AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn max_grounding_records(mut self, max: usize) -> Self {
        self.max_grounding_records = max;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let llm = self
            .llm
            .ok_or_else(|| Error::ConfigError("a language model is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| Error::ConfigError("a graph store is required".to_string()))?;
        let registry = Arc::new(self.registry.unwrap_or_default());
        let system_prompt: Arc<str> = self
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
            .into();

        Ok(Orchestrator {
            classifier: IntentClassifier::new(llm.clone(), system_prompt.clone(), &registry),
            formatter: ResponseFormatter::new(llm.clone(), system_prompt)
                .with_max_records(self.max_grounding_records),
            executor: GraphQueryExecutor::new(store, registry),
            cache: self.cache.unwrap_or_else(|| Arc::new(NoCache)),
            stage_timeout: self.stage_timeout,
            llm,
        })
    }
}
