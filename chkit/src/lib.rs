//! Clustered HTTP client for ClickHouse.
//!
//! Statements go to one healthy host at a time with failover across
//! priority tiers; DDL is broadcast to every host; inserts can be buffered
//! per model and sent in batches.

pub mod cluster;
pub mod config;
pub mod database;
pub mod errors;
pub mod metrics;
pub mod schema;
pub mod types;

pub use cluster::{BackoffPolicy, ExponentialBackoff, Host, HostManager, Tier, Topology};
pub use config::{BackoffConfig, ClusterConfig, ObservabilityConfig};
pub use database::{Client, QueryResponse, Rows};
pub use errors::{ClickHouseError, Result};
pub use schema::{Engine, FieldType, Model};
pub use types::{Column, FromValue, Row, RowDescriptor, Value};
