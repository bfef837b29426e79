//! Graph store capability
//!
//! The executor only needs to open a session, run one parameterized query in
//! it and release it. Adapters decide what "release" means for their backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One result row: column name to value
pub type Record = serde_json::Map<String, Value>;

/// Query parameters, keyed by slot name
pub type Params = BTreeMap<String, Value>;

/// A source of graph sessions
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Acquire a session for the duration of one call
    async fn open_session(&self) -> Result<Box<dyn GraphSession>>;

    /// Short backend description for logs and `doctor`
    fn describe(&self) -> String;
}

/// A unit of work against the store
///
/// Dropping a session without calling [`GraphSession::close`] must release
/// whatever it holds.
#[async_trait]
pub trait GraphSession: Send {
    /// Run a query and collect every record, in store order
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<()>;
}
