use std::time::Duration;
use thiserror::Error;

use crate::cluster::Host;

#[derive(Error, Debug)]
pub enum ClickHouseError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No available hosts: all {0} hosts are cooling down")]
    NoAvailableHosts(usize),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Broadcast to {host} failed: {source}")]
    BroadcastError {
        host: Host,
        #[source]
        source: Box<ClickHouseError>,
    },

    #[error("Timeout error: retry deadline of {0:?} exceeded")]
    TimeoutError(Duration),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ClickHouseError {
    /// Failures of a single host that the dispatcher absorbs by cooling the
    /// host down and moving on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClickHouseError::NetworkError(_) | ClickHouseError::DatabaseError(_)
        )
    }
}

impl From<reqwest::Error> for ClickHouseError {
    fn from(err: reqwest::Error) -> Self {
        ClickHouseError::NetworkError(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ClickHouseError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ClickHouseError::ParseError(format!("invalid UTF-8 in response: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ClickHouseError>;
