//! Background batch writer.
//!
//! Writers hand stamped points to a channel and return immediately. A single
//! Tokio task owns the buffer and flushes it when either threshold in
//! [`BatchSettings`] is reached:
//! - `actions` points are queued, or
//! - `flush_interval` has passed since the oldest queued point arrived.
//!
//! Explicit flush requests and channel close (the owner going away) also
//! flush. Failed flushes are logged and counted in [`BatchStats`]; they are
//! never reported back to the code that queued the points.

use crate::config::BatchSettings;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use fluxgate_core::{line_protocol, Point};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Destination of flushed batches
#[async_trait]
pub trait WriteSink: Send + Sync + 'static {
    /// Write a line protocol body (millisecond timestamps) to one database
    /// and retention policy
    async fn write(&self, database: &str, retention_policy: &str, body: String) -> Result<()>;
}

/// A point waiting to be flushed, with its destination
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub database: String,
    pub retention_policy: String,
    pub point: Point,
}

enum Command {
    Write(BatchEntry),
    Flush(oneshot::Sender<()>),
}

/// Counters for flushed batches
#[derive(Debug, Default)]
pub struct BatchStats {
    points_written: AtomicU64,
    batches_written: AtomicU64,
    bytes_written: AtomicU64,
    failed_batches: AtomicU64,
    points_dropped: AtomicU64,
}

/// Point-in-time copy of [`BatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStatsSnapshot {
    pub points_written: u64,
    pub batches_written: u64,
    pub bytes_written: u64,
    pub failed_batches: u64,
    pub points_dropped: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self, points: u64, bytes: u64) {
        self.points_written.fetch_add(points, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_failure(&self, points: u64) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.points_dropped.fetch_add(points, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            points_written: self.points_written.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the background flush task
pub struct BatchWriter {
    sender: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
    stats: Arc<BatchStats>,
}

impl BatchWriter {
    /// Spawn the flush task on the current Tokio runtime.
    ///
    /// Fails with [`ClientError::NoRuntime`] when called outside one.
    pub fn spawn<S: WriteSink>(sink: S, settings: BatchSettings) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(BatchStats::new());
        let handle = runtime.spawn(run(receiver, sink, settings, Arc::clone(&stats)));

        Ok(Self {
            sender,
            handle,
            stats,
        })
    }

    /// Queue a point; returns once it is buffered, not once it is stored
    pub fn submit(&self, entry: BatchEntry) -> Result<()> {
        self.sender
            .send(Command::Write(entry))
            .map_err(|_| ClientError::BatchClosed)
    }

    /// Flush everything queued so far and wait until the flush is done
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .map_err(|_| ClientError::BatchClosed)?;
        done.await.map_err(|_| ClientError::BatchClosed)
    }

    pub fn stats(&self) -> &Arc<BatchStats> {
        &self.stats
    }

    /// Close the channel, let the task drain, and wait for it to exit
    pub async fn close(self) -> Result<()> {
        let BatchWriter { sender, handle, .. } = self;
        drop(sender);
        handle.await?;
        Ok(())
    }
}

async fn run<S: WriteSink>(
    mut receiver: mpsc::UnboundedReceiver<Command>,
    sink: S,
    settings: BatchSettings,
    stats: Arc<BatchStats>,
) {
    let actions = settings.actions.max(1);
    let interval = settings.flush_interval();
    let mut buffer: Vec<BatchEntry> = Vec::with_capacity(actions);
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            command = receiver.recv() => match command {
                Some(Command::Write(entry)) => {
                    if buffer.is_empty() {
                        deadline = Instant::now() + interval;
                    }
                    buffer.push(entry);
                    if buffer.len() >= actions {
                        flush_buffer(&sink, &mut buffer, &stats).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    flush_buffer(&sink, &mut buffer, &stats).await;
                    let _ = ack.send(());
                }
                None => {
                    flush_buffer(&sink, &mut buffer, &stats).await;
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline), if !buffer.is_empty() => {
                flush_buffer(&sink, &mut buffer, &stats).await;
            }
        }
    }

    debug!("Batch writer stopped");
}

/// Write the buffer out, one request per (database, retention policy) in
/// first-seen order
async fn flush_buffer<S: WriteSink>(sink: &S, buffer: &mut Vec<BatchEntry>, stats: &BatchStats) {
    if buffer.is_empty() {
        return;
    }

    let mut groups: Vec<((String, String), Vec<Point>)> = Vec::new();
    for entry in buffer.drain(..) {
        let key = (entry.database, entry.retention_policy);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, points)) => points.push(entry.point),
            None => groups.push((key, vec![entry.point])),
        }
    }

    for ((database, retention_policy), points) in groups {
        let count = points.len() as u64;
        let body = match line_protocol::encode_points(&points) {
            Ok(body) => body,
            Err(e) => {
                warn!("Dropping {} points for {}.{}: {}", count, database, retention_policy, e);
                stats.record_failure(count);
                continue;
            }
        };
        let bytes = body.len() as u64;

        match sink.write(&database, &retention_policy, body).await {
            Ok(()) => {
                debug!("Flushed {} points to {}.{}", count, database, retention_policy);
                stats.record_success(count, bytes);
            }
            Err(e) => {
                warn!(
                    "Batch write of {} points to {}.{} failed: {}",
                    count, database, retention_policy, e
                );
                stats.record_failure(count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    type Writes = Arc<Mutex<Vec<(String, String, String)>>>;

    #[derive(Clone, Default)]
    struct RecordingSink {
        writes: Writes,
    }

    #[async_trait]
    impl WriteSink for RecordingSink {
        async fn write(&self, database: &str, retention_policy: &str, body: String) -> Result<()> {
            self.writes
                .lock()
                .push((database.to_string(), retention_policy.to_string(), body));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl WriteSink for FailingSink {
        async fn write(&self, _: &str, _: &str, _: String) -> Result<()> {
            Err(ClientError::Server {
                status: 500,
                message: "disk full".to_string(),
            })
        }
    }

    fn entry(database: &str, value: i64) -> BatchEntry {
        BatchEntry {
            database: database.to_string(),
            retention_policy: "default".to_string(),
            point: Point::new("cpu").field("v", value).timestamp(value),
        }
    }

    fn settings(actions: usize, flush_interval_ms: u64) -> BatchSettings {
        BatchSettings {
            actions,
            flush_interval_ms,
        }
    }

    async fn wait_for_writes(writes: &Writes, expected: usize) {
        for _ in 0..100 {
            if writes.lock().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} writes, saw {}", expected, writes.lock().len());
    }

    #[tokio::test]
    async fn test_flushes_on_point_count() {
        let sink = RecordingSink::default();
        let writer = BatchWriter::spawn(sink.clone(), settings(3, 60_000)).unwrap();

        for i in 0..3 {
            writer.submit(entry("db", i)).unwrap();
        }
        wait_for_writes(&sink.writes, 1).await;

        let writes = sink.writes.lock().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].2, "cpu v=0i 0\ncpu v=1i 1\ncpu v=2i 2");
        assert_eq!(writer.stats().snapshot().points_written, 3);
    }

    #[tokio::test]
    async fn test_flushes_on_age() {
        let sink = RecordingSink::default();
        let writer = BatchWriter::spawn(sink.clone(), settings(1000, 50)).unwrap();

        writer.submit(entry("db", 1)).unwrap();
        assert!(sink.writes.lock().is_empty());

        wait_for_writes(&sink.writes, 1).await;
        assert_eq!(sink.writes.lock()[0].2, "cpu v=1i 1");
    }

    #[tokio::test]
    async fn test_explicit_flush_groups_by_destination() {
        let sink = RecordingSink::default();
        let writer = BatchWriter::spawn(sink.clone(), settings(1000, 60_000)).unwrap();

        writer.submit(entry("a", 1)).unwrap();
        writer.submit(entry("b", 2)).unwrap();
        writer.submit(entry("a", 3)).unwrap();
        writer.flush().await.unwrap();

        let writes = sink.writes.lock().clone();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], ("a".into(), "default".into(), "cpu v=1i 1\ncpu v=3i 3".into()));
        assert_eq!(writes[1], ("b".into(), "default".into(), "cpu v=2i 2".into()));

        let stats = writer.stats().snapshot();
        assert_eq!(stats.batches_written, 2);
        assert_eq!(stats.points_written, 3);
    }

    #[tokio::test]
    async fn test_flush_with_empty_buffer_is_noop() {
        let sink = RecordingSink::default();
        let writer = BatchWriter::spawn(sink.clone(), settings(10, 60_000)).unwrap();

        writer.flush().await.unwrap();
        assert!(sink.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_buffer() {
        let sink = RecordingSink::default();
        let writer = BatchWriter::spawn(sink.clone(), settings(1000, 60_000)).unwrap();

        writer.submit(entry("db", 1)).unwrap();
        writer.submit(entry("db", 2)).unwrap();
        writer.close().await.unwrap();

        let writes = sink.writes.lock().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].2.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_flush_is_counted_not_returned() {
        let writer = BatchWriter::spawn(FailingSink, settings(1000, 60_000)).unwrap();

        writer.submit(entry("db", 1)).unwrap();
        writer.submit(entry("db", 2)).unwrap();
        writer.flush().await.unwrap();

        let stats = writer.stats().snapshot();
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.points_dropped, 2);
        assert_eq!(stats.points_written, 0);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = BatchWriter::spawn(RecordingSink::default(), settings(10, 100));
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }
}
