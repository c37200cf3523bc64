//! fluxgate core - data model for the fluxgate time series client
//!
//! This crate holds everything that does not touch the network:
//! - `Point`: an immutable measurement record with tags and typed fields
//! - `FieldValue`: the closed set of field kinds a server accepts
//! - `line_protocol`: encoding points for the write endpoint (and parsing them back)
//! - `query`: the JSON result model returned by the query endpoint, plus the
//!   helpers that fold it into maps, column lists and printable reports

pub mod error;
pub mod line_protocol;
pub mod query;
pub mod types;

pub use error::{CoreError, Result};
pub use query::{QueryResponse, ReadMap, Series, StatementResult};
pub use types::*;
