//! fluxgate client - a small facade over an InfluxDB-compatible HTTP server
//!
//! - Connection setup and a polling readiness probe
//! - Database create / drop / list / exists
//! - Point assembly helpers and batched writes (flushed on a point count or
//!   a time threshold by a background task)
//! - Scoped reads that fold results into a map, column listings and a
//!   printable report
//!
//! ## Usage
//!
//! ```no_run
//! use fluxgate_client::FluxClient;
//!
//! #[tokio::main]
//! async fn main() -> fluxgate_client::Result<()> {
//!     let client = FluxClient::new("localhost")?;
//!     if !client.ping(5).await? {
//!         eprintln!("server not ready");
//!         return Ok(());
//!     }
//!
//!     client.create_database("metrics").await?;
//!     let point = client.new_point_with_tag("cpu", "host", "a1");
//!     client.write("metrics", &point, "load", 0.75)?;
//!     client.flush().await?;
//!
//!     let loads = client.read("metrics", "cpu", "load").await?;
//!     println!("{:?}", loads);
//!
//!     client.close().await
//! }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod influxql;
pub mod transport;

pub use batch::{BatchStats, BatchStatsSnapshot};
pub use client::FluxClient;
pub use config::{BatchSettings, ClientConfig, ProbeSettings};
pub use error::{ClientError, Result};
pub use fluxgate_core::{FieldValue, Point, QueryResponse, ReadMap, Timestamp};
pub use transport::HttpTransport;
