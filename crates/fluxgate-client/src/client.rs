//! The client facade

use crate::batch::{BatchEntry, BatchStatsSnapshot, BatchWriter};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::influxql;
use crate::transport::{HttpTransport, UNKNOWN_VERSION};
use fluxgate_core::query::{column_names, first_column_strings, fold_pairs, render_report};
use fluxgate_core::{now_millis, FieldValue, Point, QueryResponse, ReadMap, Timestamp};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client for one time series server.
///
/// Owns the HTTP connection pool and the background batch writer. Writes
/// return as soon as the point is queued; call [`FluxClient::flush`] to push
/// queued points out and [`FluxClient::close`] to drain and stop the writer.
/// Dropping the client also stops the writer after a final flush, provided
/// the runtime keeps running.
pub struct FluxClient {
    config: ClientConfig,
    transport: HttpTransport,
    batch: BatchWriter,
}

impl FluxClient {
    /// Connect with a full configuration.
    ///
    /// Spawns the batch writer, so this must run inside a Tokio runtime;
    /// outside one it fails with [`ClientError::NoRuntime`].
    pub fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        let batch = BatchWriter::spawn(transport.clone(), config.batch.clone())?;

        info!(
            "Connected to {} as {} (batch: {} points / {}ms)",
            transport.base_url(),
            config.username,
            config.batch.actions,
            config.batch.flush_interval_ms
        );

        Ok(Self {
            config,
            transport,
            batch,
        })
    }

    /// Connect to `host` on the default port with the default credentials
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::connect(ClientConfig::new(host))
    }

    /// Connect to `host` on the default port with explicit credentials
    pub fn with_credentials(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::connect(ClientConfig::with_credentials(host, username, password))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Version the server reports right now
    pub async fn version(&self) -> Result<String> {
        self.transport.ping().await
    }

    /// Wait for the server to report a real version.
    ///
    /// Probes up to `timeout * probe.attempts_per_unit` times, sleeping
    /// `probe.interval` between attempts, and stops at the first probe that
    /// reports something other than "unknown". Returns whether that happened
    /// within the budget. Transport errors end the wait with `Err`.
    pub async fn ping(&self, timeout: u32) -> Result<bool> {
        let max_attempts = timeout.saturating_mul(self.config.probe.attempts_per_unit);
        let interval = self.config.probe.interval();

        for attempt in 1..=max_attempts {
            let version = self.transport.ping().await?;
            if !version.eq_ignore_ascii_case(UNKNOWN_VERSION) {
                info!("Server ready, version {} (attempt {})", version, attempt);
                return Ok(true);
            }
            debug!("Server not ready (attempt {}/{})", attempt, max_attempts);
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!("Server not ready after {} attempts", max_attempts);
        Ok(false)
    }

    /// Create a database and report whether it exists afterwards.
    ///
    /// Creating an existing database is not an error.
    pub async fn create_database(&self, name: &str) -> Result<bool> {
        self.transport
            .execute(&influxql::create_database(name))
            .await?;
        let exists = self.database_exists(name).await?;
        info!("Created database {} (exists: {})", name, exists);
        Ok(exists)
    }

    pub async fn drop_database(&self, name: &str) -> Result<()> {
        self.transport.execute(&influxql::drop_database(name)).await?;
        info!("Dropped database {}", name);
        Ok(())
    }

    /// Database names in the order the server lists them
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let response = self
            .transport
            .execute(&influxql::show_databases())
            .await?;
        Ok(first_column_strings(&response))
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        let databases = self.list_databases().await?;
        Ok(databases.iter().any(|db| db == name))
    }

    /// A point with no tags
    pub fn new_point(&self, measurement: impl Into<String>) -> Point {
        Point::new(measurement)
    }

    /// A point with one tag
    pub fn new_point_with_tag(
        &self,
        measurement: impl Into<String>,
        tag: impl Into<String>,
        value: impl Into<String>,
    ) -> Point {
        Point::new(measurement).tag(tag, value)
    }

    /// A point with every tag from `tags`
    pub fn new_point_with_tags<I, K, V>(&self, measurement: impl Into<String>, tags: I) -> Point
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Point::new(measurement).tags(tags)
    }

    /// Queue `point` with one extra field, stamped with the current time.
    /// Returns the timestamp (milliseconds) the point was stamped with.
    pub fn write(
        &self,
        database: &str,
        point: &Point,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Timestamp> {
        self.submit(database, point.clone().field(field, value))
    }

    /// Queue `point` with every value applied to the same field key; a field
    /// holds one value, so the last one is what gets written
    pub fn write_values<I>(
        &self,
        database: &str,
        point: &Point,
        field: &str,
        values: I,
    ) -> Result<Timestamp>
    where
        I: IntoIterator,
        I::Item: Into<FieldValue>,
    {
        let point = values
            .into_iter()
            .fold(point.clone(), |p, value| p.field(field, value));
        self.submit(database, point)
    }

    /// Queue `point` with every field from `fields`
    pub fn write_fields<I, K, V>(
        &self,
        database: &str,
        point: &Point,
        fields: I,
    ) -> Result<Timestamp>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.submit(database, point.clone().fields(fields))
    }

    fn submit(&self, database: &str, point: Point) -> Result<Timestamp> {
        let timestamp = now_millis();
        let point = point.timestamp(timestamp);
        point.validate()?;

        self.batch.submit(BatchEntry {
            database: database.to_string(),
            retention_policy: self.config.retention_policy.clone(),
            point,
        })?;
        Ok(timestamp)
    }

    /// Run an arbitrary read statement against `database`
    pub async fn query(&self, database: &str, statement: &str) -> Result<QueryResponse> {
        self.transport.query(database, statement).await
    }

    /// Read one column of a measurement as `time -> value`.
    ///
    /// Keys are the first result cell as text (millisecond epochs). The
    /// wildcard is rejected because rows would no longer be pairs.
    pub async fn read(&self, database: &str, measurement: &str, column: &str) -> Result<ReadMap> {
        if influxql::is_wildcard(column) {
            return Err(ClientError::WildcardNotSupported);
        }
        let response = self
            .query(database, &influxql::select(column, measurement))
            .await?;
        Ok(fold_pairs(&response))
    }

    /// Column names of every series of a measurement, concatenated
    pub async fn read_tags(&self, database: &str, measurement: &str) -> Result<Vec<String>> {
        let response = self
            .query(database, &influxql::select(influxql::WILDCARD, measurement))
            .await?;
        Ok(column_names(&response))
    }

    /// Text report of one column (or `*`) of a measurement
    pub async fn dump(&self, database: &str, measurement: &str, column: &str) -> Result<String> {
        let response = self
            .query(database, &influxql::select(column, measurement))
            .await?;
        Ok(render_report(&response))
    }

    /// Push every queued point out now
    pub async fn flush(&self) -> Result<()> {
        self.batch.flush().await
    }

    pub fn stats(&self) -> BatchStatsSnapshot {
        self.batch.stats().snapshot()
    }

    /// Flush queued points and stop the batch writer
    pub async fn close(self) -> Result<()> {
        let stats = Arc::clone(self.batch.stats());
        self.batch.close().await?;
        let stats = stats.snapshot();
        info!(
            "Closed client ({} points in {} batches, {} failed)",
            stats.points_written, stats.batches_written, stats.failed_batches
        );
        Ok(())
    }
}
