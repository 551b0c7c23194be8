// chkit/src/database/transport.rs
//
// HTTP transport to a single host. The dispatcher only sees the `Transport`
// trait, so tests can swap in an in-memory implementation.
//

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::cluster::Host;
use crate::config::ClusterConfig;
use crate::errors::{ClickHouseError, Result};

/// Source of response body chunks, read lazily.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.chunk().await?)
    }
}

/// A fully buffered body handed out as a single chunk.
struct OnceChunk(Option<Bytes>);

#[async_trait]
impl ChunkSource for OnceChunk {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.0.take().filter(|b| !b.is_empty()))
    }
}

pub enum Body {
    Full(Bytes),
    Stream(Box<dyn ChunkSource>),
}

impl Body {
    pub async fn bytes(self) -> Result<Bytes> {
        match self {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut source) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = source.next_chunk().await? {
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn into_source(self) -> Box<dyn ChunkSource> {
        match self {
            Body::Full(bytes) => Box::new(OnceChunk(Some(bytes))),
            Body::Stream(source) => source,
        }
    }
}

pub struct TransportResponse {
    pub status: u16,
    pub body: Body,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `statement` to `host`. With `stream` set the body is left unread
    /// for the caller to consume incrementally.
    async fn post(
        &self,
        host: &Host,
        statement: Bytes,
        timeout: Option<Duration>,
        stream: bool,
    ) -> Result<TransportResponse>;
}

/// `reqwest`-backed transport with credentials in the query string.
pub struct HttpTransport {
    client: reqwest::Client,
    params: Vec<(&'static str, String)>,
    retries_per_host: u32,
}

impl HttpTransport {
    pub fn new(config: &ClusterConfig, pool_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size.max(1))
            .build()
            .map_err(|e| ClickHouseError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let mut params = Vec::new();
        if let Some(user) = &config.username {
            params.push(("user", user.clone()));
        }
        if let Some(password) = &config.password {
            params.push(("password", password.clone()));
        }

        Ok(Self {
            client,
            params,
            retries_per_host: config.retries_per_host,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        host: &Host,
        statement: Bytes,
        timeout: Option<Duration>,
        stream: bool,
    ) -> Result<TransportResponse> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .post(host.url())
                .query(&self.params)
                .body(statement.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = if stream {
                        Body::Stream(Box::new(response))
                    } else {
                        Body::Full(response.bytes().await?)
                    };
                    return Ok(TransportResponse { status, body });
                }
                // Only connection failures are safe to repeat: the statement never left.
                Err(err) if err.is_connect() && attempt < self.retries_per_host => {
                    attempt += 1;
                    warn!(
                        "Connection to {} failed (attempt {}/{}): {}",
                        host,
                        attempt,
                        self.retries_per_host + 1,
                        err
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
