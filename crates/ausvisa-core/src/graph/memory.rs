//! In-process graph store with canned results
//!
//! Answers queries by matching registered fragments against the query text.
//! Useful for offline runs and for exercising the pipeline without a server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::store::{GraphSession, GraphStore, Params, Record};

/// A query the store has seen
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub query: String,
    pub params: Params,
}

#[derive(Default)]
struct Shared {
    queries: Mutex<Vec<RecordedQuery>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Graph store that serves records from memory
#[derive(Clone, Default)]
pub struct MemoryGraph {
    responses: Vec<(String, Vec<Record>)>,
    failure: Option<String>,
    shared: Arc<Shared>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` for any query containing `fragment`
    ///
    /// Fragments are tried in registration order; unmatched queries yield no
    /// records.
    pub fn with_result(mut self, fragment: impl Into<String>, records: Vec<Record>) -> Self {
        self.responses.push((fragment.into(), records));
        self
    }

    /// Fail every query with a store error
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Queries run so far, in order
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.shared
            .queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    pub fn sessions_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            graph: self.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("in-memory ({} canned results)", self.responses.len())
    }
}

struct MemorySession {
    graph: MemoryGraph,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>> {
        if let Ok(mut queries) = self.graph.shared.queries.lock() {
            queries.push(RecordedQuery {
                query: query.to_string(),
                params: params.clone(),
            });
        }

        if let Some(message) = &self.graph.failure {
            return Err(Error::GraphStoreError(message.clone()));
        }

        Ok(self
            .graph
            .responses
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, records)| records.clone())
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.graph.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}
