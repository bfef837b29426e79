//! Knowledge graph access
//!
//! - [`GraphStore`] / [`GraphSession`]: the capability the executor runs against
//! - [`Neo4jStore`]: Neo4j over Bolt, pooled by `neo4rs`
//! - [`MemoryGraph`]: canned results served from memory
//! - [`GraphQueryExecutor`]: query type + entities to records

mod executor;
mod memory;
mod neo4j;
mod store;

pub use executor::{GraphQueryExecutor, GraphStats};
pub use memory::{MemoryGraph, RecordedQuery};
pub use neo4j::{Neo4jSession, Neo4jStore};
pub use store::{GraphSession, GraphStore, Params, Record};
