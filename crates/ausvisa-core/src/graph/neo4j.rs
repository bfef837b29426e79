//! Neo4j adapter over Bolt, via `neo4rs`
//!
//! The driver owns a connection pool. A session leases nothing up front; each
//! query borrows a pooled connection until its row stream is drained or
//! dropped, so an abandoned call hands its connection straight back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query, query};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::error::{Error, Result};

use super::store::{GraphSession, GraphStore, Params, Record};

/// Graph store backed by a Neo4j server
///
/// Connects on first use, so building a store never fails and an unreachable
/// server surfaces as a query error the pipeline can degrade around.
pub struct Neo4jStore {
    uri: String,
    database: String,
    user: String,
    password: String,
    max_connections: usize,
    timeout: Duration,
    graph: OnceCell<Arc<Graph>>,
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish()
    }
}

impl Neo4jStore {
    /// Store for `config`, reading the password from the environment
    pub fn new(config: &GraphConfig) -> Self {
        Self::with_password(config, config.resolved_password())
    }

    pub fn with_password(config: &GraphConfig, password: Option<String>) -> Self {
        Self {
            uri: config.uri.clone(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: password.unwrap_or_default(),
            max_connections: config.max_connections,
            timeout: Duration::from_secs(config.timeout_secs),
            graph: OnceCell::new(),
        }
    }

    async fn graph(&self) -> Result<Arc<Graph>> {
        self.graph
            .get_or_try_init(|| async {
                let config = ConfigBuilder::default()
                    .uri(self.uri.as_str())
                    .user(self.user.as_str())
                    .password(self.password.as_str())
                    .db(self.database.as_str())
                    .max_connections(self.max_connections)
                    .build()
                    .map_err(|e| driver_error(e, &self.user))?;

                let graph = tokio::time::timeout(self.timeout, Graph::connect(config))
                    .await
                    .map_err(|_| Error::GraphStoreError(format!("connecting to {} timed out", self.uri)))?
                    .map_err(|e| driver_error(e, &self.user))?;

                info!(uri = %self.uri, database = %self.database, "Connected to Neo4j");
                Ok::<_, Error>(Arc::new(graph))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn open_session(&self) -> Result<Box<dyn GraphSession>> {
        let graph = self.graph().await?;
        Ok(Box::new(Neo4jSession {
            graph,
            user: self.user.clone(),
            timeout: self.timeout,
        }))
    }

    fn describe(&self) -> String {
        format!("neo4j {} (database {})", self.uri, self.database)
    }
}

/// Handle on the shared pool for one executor call
pub struct Neo4jSession {
    graph: Arc<Graph>,
    user: String,
    timeout: Duration,
}

impl Neo4jSession {
    async fn fetch(&self, q: Query) -> Result<Vec<Record>> {
        let mut rows = self
            .graph
            .execute(q)
            .await
            .map_err(|e| driver_error(e, &self.user))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| driver_error(e, &self.user))? {
            let record = row
                .to::<Record>()
                .map_err(|e| Error::GraphStoreError(format!("unreadable row: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run(&mut self, cypher: &str, params: &Params) -> Result<Vec<Record>> {
        let q = params
            .iter()
            .fold(query(cypher), |q, (name, value)| q.param(name, bolt_value(value)));

        debug!(params = params.len(), "Running graph query");
        tokio::time::timeout(self.timeout, self.fetch(q))
            .await
            .map_err(|_| Error::GraphStoreError("graph query timed out".to_string()))?
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Connections go back to the pool as each row stream ends
        Ok(())
    }
}

/// JSON parameter value as a Bolt value
fn bolt_value(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(bolt_value(item));
            }
            BoltType::List(list)
        }
        Value::Object(fields) => {
            let mut map = BoltMap::new();
            for (key, item) in fields {
                map.put(BoltString::from(key.as_str()), bolt_value(item));
            }
            BoltType::Map(map)
        }
    }
}

fn driver_error(error: neo4rs::Error, user: &str) -> Error {
    match error {
        neo4rs::Error::AuthenticationError(_) => Error::GraphUnauthorized(user.to_string()),
        other => Error::GraphStoreError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_bolt_value_scalars() {
        assert_eq!(bolt_value(&json!("500")), BoltType::from("500"));
        assert_eq!(bolt_value(&json!(6)), BoltType::from(6_i64));
        assert_eq!(bolt_value(&json!(6.5)), BoltType::from(6.5_f64));
        assert_eq!(bolt_value(&json!(true)), BoltType::from(true));
        assert_eq!(bolt_value(&Value::Null), BoltType::Null(BoltNull));
    }

    #[test]
    fn test_bolt_value_nested() {
        let value = bolt_value(&json!({"levels": ["Bachelor", "Master"]}));
        let BoltType::Map(map) = &value else {
            panic!("expected a map, got {:?}", value);
        };
        let Some(BoltType::List(levels)) = map.value.get(&BoltString::from("levels")) else {
            panic!("expected a list under levels");
        };
        assert_eq!(
            levels.value,
            vec![BoltType::from("Bachelor"), BoltType::from("Master")]
        );
    }

    #[test]
    fn test_authentication_failure_maps_to_unauthorized() {
        let err = driver_error(
            neo4rs::Error::AuthenticationError("The client is unauthorized".to_string()),
            "reader",
        );
        assert!(matches!(err, Error::GraphUnauthorized(ref user) if user == "reader"));
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn test_describe_and_debug_hide_password() {
        let store = Neo4jStore::with_password(&Config::default().graph, Some("secret".to_string()));
        assert_eq!(store.describe(), "neo4j neo4j://localhost:7687 (database neo4j)");
        let debug = format!("{:?}", store);
        assert!(debug.contains("localhost:7687"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        let mut config = Config::default().graph;
        // Nothing listens on the discard port
        config.uri = "127.0.0.1:9".to_string();
        config.timeout_secs = 5;

        let store = Neo4jStore::with_password(&config, Some("secret".to_string()));
        let outcome = match store.open_session().await {
            Ok(mut session) => session.run("RETURN 1 AS ok", &Params::new()).await,
            Err(e) => Err(e),
        };
        assert!(matches!(outcome, Err(Error::GraphStoreError(_))));
    }
}
