use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::templates::TemplateRegistry;

use super::store::{GraphStore, Params, Record};

const STATS_QUERY: &str = "\
MATCH (u:University) WITH count(u) AS unis
MATCH (p:Program) WITH unis, count(p) AS progs
MATCH (v:Visa) WITH unis, progs, count(v) AS visas
RETURN unis, progs, visas";

const HEALTH_QUERY: &str = "RETURN 1 AS ok";

/// Node counts in the knowledge graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub universities: u64,
    pub programs: u64,
    pub visas: u64,
}

/// Resolves query types to templates and runs them against a store
#[derive(Clone)]
pub struct GraphQueryExecutor {
    store: Arc<dyn GraphStore>,
    registry: Arc<TemplateRegistry>,
}

impl GraphQueryExecutor {
    pub fn new(store: Arc<dyn GraphStore>, registry: Arc<TemplateRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    /// Run the template registered as `query_type`
    ///
    /// Only the parameters the template references are sent. Fails without
    /// touching the store if the type is unknown or a parameter is unbound.
    pub async fn try_execute(&self, query_type: &str, params: &Params) -> Result<Vec<Record>> {
        let template = self
            .registry
            .get(query_type)
            .ok_or_else(|| Error::UnknownQueryType(query_type.to_string()))?;
        let bound = template.bind(params)?;

        let records = self.run(&template.body, &bound).await?;
        debug!(query_type, records = records.len(), "Graph query complete");
        Ok(records)
    }

    /// Like [`Self::try_execute`], with every failure degraded to no records
    pub async fn execute(&self, query_type: &str, params: &Params) -> Vec<Record> {
        match self.try_execute(query_type, params).await {
            Ok(records) => records,
            Err(e @ Error::UnknownQueryType(_)) => {
                debug!(query_type, error = %e, "No template for query type");
                Vec::new()
            }
            Err(e) => {
                warn!(query_type, error = %e, code = e.code(), "Graph query failed");
                Vec::new()
            }
        }
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        let records = self.run(STATS_QUERY, &Params::new()).await?;
        let Some(record) = records.first() else {
            return Ok(GraphStats::default());
        };

        Ok(GraphStats {
            universities: count_field(record, "unis"),
            programs: count_field(record, "progs"),
            visas: count_field(record, "visas"),
        })
    }

    /// Whether the store answers a trivial query
    pub async fn health(&self) -> bool {
        match self.run(HEALTH_QUERY, &Params::new()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, code = e.code(), "Graph health probe failed");
                false
            }
        }
    }

    /// One session per call, released on every path
    async fn run(&self, query: &str, params: &Params) -> Result<Vec<Record>> {
        let mut session = self.store.open_session().await?;
        let outcome = session.run(query, params).await;
        let closed = session.close().await;

        let records = outcome?;
        if let Err(e) = closed {
            warn!(error = %e, "Failed to release graph session");
        }
        Ok(records)
    }
}

fn count_field(record: &Record, field: &str) -> u64 {
    record.get(field).and_then(Value::as_u64).unwrap_or(0)
}
