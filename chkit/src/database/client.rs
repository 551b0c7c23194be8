// chkit/src/database/client.rs
//
// Cluster client: dispatches a statement to one healthy host with failover,
// broadcasts DDL to every host and batches inserts per model.
//

use std::any::TypeId;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::buffer::{Batch, WriteBuffer};
use super::query_builder::QueryBuilder;
use super::response::{QueryResponse, Rows};
use super::transport::{Body, HttpTransport, Transport};
use crate::cluster::{BackoffPolicy, ExponentialBackoff, Host, HostManager};
use crate::config::ClusterConfig;
use crate::errors::{ClickHouseError, Result};
use crate::metrics;
use crate::schema::Model;
use crate::types::Row;

pub struct Client {
    config: ClusterConfig,
    hosts: Arc<HostManager>,
    backoff: Arc<dyn BackoffPolicy>,
    transport: Arc<dyn Transport>,
    buffer: WriteBuffer,
}

impl Client {
    /// Build a client over HTTP without touching the network.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let hosts = HostManager::from_topology(&config.topology)?;
        let transport = HttpTransport::new(&config, hosts.len())?;
        Ok(Self::assemble(config, hosts, Arc::new(transport)))
    }

    /// Build a client and make sure its database exists on every host.
    pub async fn connect(config: ClusterConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client
            .create_database(Some(client.config.init_timeout()))
            .await?;
        Ok(client)
    }

    /// Build a client over a custom transport.
    pub fn with_transport(config: ClusterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let hosts = HostManager::from_topology(&config.topology)?;
        Ok(Self::assemble(config, hosts, transport))
    }

    fn assemble(config: ClusterConfig, hosts: HostManager, transport: Arc<dyn Transport>) -> Self {
        info!(
            "ClickHouse client for database {} over {} hosts",
            config.database,
            hosts.len()
        );
        Self {
            backoff: Arc::new(ExponentialBackoff::from_config(&config.backoff)),
            buffer: WriteBuffer::new(config.buffer_size),
            hosts: Arc::new(hosts),
            transport,
            config,
        }
    }

    /// Replace the cooldown policy.
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    pub fn hosts(&self) -> &Arc<HostManager> {
        &self.hosts
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Rows waiting in the write buffer across all models.
    pub fn pending_rows(&self) -> usize {
        self.buffer.pending()
    }

    /// Send `statement` to one host, failing over to the next eligible host
    /// until one answers or none is left. Uses the configured retry deadline.
    pub async fn query(
        &self,
        statement: &str,
        stream: bool,
        timeout: Option<Duration>,
    ) -> Result<QueryResponse> {
        self.query_with_deadline(statement, stream, timeout, self.config.retry_deadline())
            .await
    }

    pub async fn query_with_deadline(
        &self,
        statement: &str,
        stream: bool,
        timeout: Option<Duration>,
        deadline: Option<Duration>,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let result = self
            .dispatch(Bytes::from(statement.to_owned()), stream, timeout, deadline, started)
            .await;
        metrics::record_operation("query", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(
        &self,
        statement: Bytes,
        stream: bool,
        timeout: Option<Duration>,
        deadline: Option<Duration>,
        started: Instant,
    ) -> Result<QueryResponse> {
        let timeout = timeout.or(self.config.request_timeout());
        loop {
            let mut attempt_timeout = timeout;
            let mut clipped = false;
            if let Some(limit) = deadline {
                let remaining = limit.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(ClickHouseError::TimeoutError(limit));
                }
                clipped = timeout.map_or(true, |t| t > remaining);
                attempt_timeout = Some(attempt_timeout.map_or(remaining, |t| t.min(remaining)));
            }

            let host = self.hosts.get()?;
            let result = self.send(&host, statement.clone(), attempt_timeout, stream).await;

            // The caller's budget ran out mid-request; the host is not to blame.
            if let (Err(err), Some(limit)) = (&result, deadline) {
                if clipped && started.elapsed() >= limit {
                    warn!("Retry deadline reached while waiting on {}: {}", host, err);
                    return Err(ClickHouseError::TimeoutError(limit));
                }
            }

            match result {
                Ok(body) => {
                    self.backoff.reset(&host);
                    self.hosts.release(&host);
                    return Ok(QueryResponse::new(host, body));
                }
                Err(err) if err.is_transient() => {
                    error!("Error while requesting to {}: {}", host, err);
                    let cooldown = self.backoff.compute(&host);
                    self.hosts.cooldown(&host, cooldown);
                    metrics::record_host_failure(host.url());
                    error!("Host {} is cooling down for {:?}", host, cooldown);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One request to one host. Non-2xx answers become `DatabaseError` with
    /// the server's message.
    async fn send(
        &self,
        host: &Host,
        statement: Bytes,
        timeout: Option<Duration>,
        stream: bool,
    ) -> Result<Body> {
        debug!("Sending {} bytes to {}", statement.len(), host);
        let response = self.transport.post(host, statement, timeout, stream).await?;
        if response.is_success() {
            return Ok(response.body);
        }
        let status = response.status;
        let message = response.body.bytes().await?;
        Err(ClickHouseError::DatabaseError(format!(
            "HTTP {}: {}",
            status,
            String::from_utf8_lossy(&message).trim()
        )))
    }

    /// Send `statement` to every registered host, cooling or not, in
    /// priority order. Returns the number of hosts that succeeded. With
    /// `ensure` the first failure aborts the broadcast.
    pub async fn broadcast(
        &self,
        statement: &str,
        ensure: bool,
        timeout: Option<Duration>,
    ) -> Result<usize> {
        let started = Instant::now();
        let statement = Bytes::from(statement.to_owned());
        let timeout = timeout.or(self.config.request_timeout());
        let hosts = self.hosts.hosts_set();
        let mut succeeded = 0;

        for host in hosts.iter() {
            match self.send(host, statement.clone(), timeout, false).await {
                Ok(_) => succeeded += 1,
                Err(err) => {
                    error!("Error while broadcasting to {}: {}", host, err);
                    if ensure {
                        metrics::record_operation("broadcast", false, started.elapsed().as_secs_f64());
                        return Err(ClickHouseError::BroadcastError {
                            host: host.clone(),
                            source: Box::new(err),
                        });
                    }
                }
            }
        }

        if succeeded < hosts.len() {
            warn!("Broadcast reached {} of {} hosts", succeeded, hosts.len());
        }
        metrics::record_operation("broadcast", succeeded == hosts.len(), started.elapsed().as_secs_f64());
        Ok(succeeded)
    }

    pub async fn create_database(&self, timeout: Option<Duration>) -> Result<()> {
        info!("Creating database {} on {} hosts", self.config.database, self.hosts.len());
        let statement = QueryBuilder::build_create_database(&self.config.database);
        self.broadcast(&statement, true, timeout).await?;
        Ok(())
    }

    pub async fn drop_database(&self, timeout: Option<Duration>) -> Result<()> {
        info!("Dropping database {} on {} hosts", self.config.database, self.hosts.len());
        let statement = QueryBuilder::build_drop_database(&self.config.database);
        self.broadcast(&statement, true, timeout).await?;
        Ok(())
    }

    pub async fn create_table<M: Model>(&self) -> Result<()> {
        info!("Creating table {}", M::table_name());
        self.broadcast(&M::create_table_sql(&self.config.database), true, None)
            .await?;
        Ok(())
    }

    pub async fn drop_table<M: Model>(&self) -> Result<()> {
        info!("Dropping table {}", M::table_name());
        self.broadcast(&M::drop_table_sql(&self.config.database), true, None)
            .await?;
        Ok(())
    }

    /// Buffer `rows` and send the model's pending batch once it reaches the
    /// configured size.
    pub async fn insert<M: Model>(&self, rows: &[M]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let lines = rows
            .iter()
            .map(|row| row.to_tsv())
            .collect::<Result<Vec<_>>>()?;
        if let Some(batch) = self.buffer.push::<M>(lines) {
            self.send_batch(batch).await?;
        }
        Ok(())
    }

    /// Send everything still buffered. Stops at the first failing batch;
    /// batches not yet attempted stay buffered.
    pub async fn flush(&self) -> Result<()> {
        for key in self.buffer.keys() {
            self.flush_key(key).await?;
        }
        Ok(())
    }

    pub async fn flush_model<M: Model>(&self) -> Result<()> {
        self.flush_key(TypeId::of::<M>()).await
    }

    async fn flush_key(&self, key: TypeId) -> Result<()> {
        match self.buffer.take(key) {
            Some(batch) => self.send_batch(batch).await,
            None => Ok(()),
        }
    }

    async fn send_batch(&self, batch: Batch) -> Result<()> {
        debug!("Flushing {} rows into {}", batch.lines.len(), batch.table);
        let statement =
            QueryBuilder::build_insert_query(&self.config.database, &batch.table, &batch.lines);
        self.query(&statement, false, None).await?;
        Ok(())
    }

    /// Run a select against `M`'s table and stream typed rows. `$db` and
    /// `$table` are substituted.
    pub async fn select<M: Model>(&self, sql: &str) -> Result<Rows<M>> {
        let statement = self.prepare_select(sql, Some(&M::table_name()))?;
        let response = self.query(&statement, true, None).await?;
        Rows::typed(response.into_lines()).await
    }

    /// Run a select and stream rows typed by the result header.
    pub async fn select_rows(&self, sql: &str) -> Result<Rows<Row>> {
        let statement = self.prepare_select(sql, None)?;
        let response = self.query(&statement, true, None).await?;
        Rows::dynamic(response.into_lines()).await
    }

    fn prepare_select(&self, sql: &str, table: Option<&str>) -> Result<String> {
        let sql = QueryBuilder::substitute(sql, &self.config.database, table)?;
        Ok(QueryBuilder::build_select_query(&sql))
    }

    pub async fn count<M: Model>(&self, conditions: Option<&str>) -> Result<u64> {
        let statement = QueryBuilder::substitute(
            &QueryBuilder::build_count_query(conditions),
            &self.config.database,
            Some(&M::table_name()),
        )?;
        let text = self.query(&statement, false, None).await?.text().await?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(0);
        }
        text.parse()
            .map_err(|e| ClickHouseError::ParseError(format!("bad count {:?}: {}", text, e)))
    }
}
