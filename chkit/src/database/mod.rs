//! Talking to the cluster: transport, failover dispatch, broadcast and the
//! write buffer.

pub mod buffer;
pub mod client;
pub mod query_builder;
pub mod response;
pub mod transport;

pub use buffer::{Batch, WriteBuffer};
pub use client::Client;
pub use query_builder::QueryBuilder;
pub use response::{LineStream, QueryResponse, Rows};
pub use transport::{Body, ChunkSource, HttpTransport, Transport, TransportResponse};
