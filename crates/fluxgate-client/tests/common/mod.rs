//! In-process stand-in for a time series server.
//!
//! Serves just enough of `/ping`, `/write` and `/query` for the client:
//! database admin statements, `SELECT <column> FROM "<measurement>"` and
//! `SELECT * FROM "<measurement>"` over the points it has been sent.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fluxgate_client::ClientConfig;
use fluxgate_core::{line_protocol, FieldValue, Point};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SERVER_VERSION: &str = "1.8.10";

/// Parameters of one accepted write request
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub database: String,
    pub retention_policy: String,
    pub precision: String,
    pub points: usize,
}

#[derive(Default)]
pub struct FakeState {
    /// Pings answered with version "unknown" before reporting a real one
    unknown_pings: usize,
    pub ping_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub databases: Mutex<Vec<String>>,
    pub points: Mutex<Vec<(String, Point)>>,
    pub writes: Mutex<Vec<WriteRequest>>,
    pub auth_headers: Mutex<Vec<String>>,
}

impl FakeState {
    fn record_auth(&self, headers: &HeaderMap) {
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            self.auth_headers.lock().push(auth.to_string());
        }
    }

    pub fn points_in(&self, database: &str) -> Vec<Point> {
        self.points
            .lock()
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

pub struct FakeServer {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::start_with_unknown_pings(0).await
    }

    pub async fn start_with_unknown_pings(unknown_pings: usize) -> Self {
        let state = Arc::new(FakeState {
            unknown_pings,
            ..Default::default()
        });

        let app = Router::new()
            .route("/ping", get(ping))
            .route("/write", post(write))
            .route("/query", get(query).post(query))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1").port(self.addr.port())
    }
}

async fn ping(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    let call = state.ping_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let version = if call <= state.unknown_pings {
        "unknown"
    } else {
        SERVER_VERSION
    };
    (StatusCode::NO_CONTENT, [("X-Influxdb-Version", version)])
}

async fn write(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.record_auth(&headers);
    let database = params.get("db").cloned().unwrap_or_default();
    if !state.databases.lock().contains(&database) {
        let error = json!({ "error": format!("database not found: \"{}\"", database) });
        return (StatusCode::NOT_FOUND, Json(error)).into_response();
    }

    let mut points = Vec::new();
    for parsed in line_protocol::parse_lines(&body) {
        match parsed {
            Ok(point) => points.push(point),
            Err(e) => {
                let error = json!({ "error": e.to_string() });
                return (StatusCode::BAD_REQUEST, Json(error)).into_response();
            }
        }
    }

    state.writes.lock().push(WriteRequest {
        database: database.clone(),
        retention_policy: params.get("rp").cloned().unwrap_or_default(),
        precision: params.get("precision").cloned().unwrap_or_default(),
        points: points.len(),
    });
    state
        .points
        .lock()
        .extend(points.into_iter().map(|p| (database.clone(), p)));

    StatusCode::NO_CONTENT.into_response()
}

async fn query(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    state.record_auth(&headers);
    state.query_calls.fetch_add(1, Ordering::SeqCst);

    let statement = params.get("q").cloned().unwrap_or_default();
    let database = params.get("db").cloned().unwrap_or_default();
    Json(json!({ "results": [execute(&state, &database, statement.trim())] }))
}

fn execute(state: &FakeState, database: &str, statement: &str) -> Value {
    if statement == "SHOW DATABASES" {
        let values: Vec<Value> = state
            .databases
            .lock()
            .iter()
            .map(|db| json!([db]))
            .collect();
        let mut series = json!({ "name": "databases", "columns": ["name"] });
        if !values.is_empty() {
            series["values"] = Value::Array(values);
        }
        return json!({ "statement_id": 0, "series": [series] });
    }

    if let Some(name) = statement.strip_prefix("CREATE DATABASE ") {
        let name = unquote(name);
        let mut databases = state.databases.lock();
        if !databases.contains(&name) {
            databases.push(name);
        }
        return json!({ "statement_id": 0 });
    }

    if let Some(name) = statement.strip_prefix("DROP DATABASE ") {
        let name = unquote(name);
        state.databases.lock().retain(|db| *db != name);
        state.points.lock().retain(|(db, _)| *db != name);
        return json!({ "statement_id": 0 });
    }

    if let Some(rest) = statement.strip_prefix("SELECT ") {
        if !state.databases.lock().iter().any(|db| db == database) {
            return json!({
                "statement_id": 0,
                "error": format!("database not found: {}", database),
            });
        }
        if let Some((column, measurement)) = rest.split_once(" FROM ") {
            return select(state, database, column.trim(), &unquote(measurement.trim()));
        }
    }

    json!({ "statement_id": 0, "error": format!("error parsing query: {}", statement) })
}

fn select(state: &FakeState, database: &str, column: &str, measurement: &str) -> Value {
    let points: Vec<Point> = state
        .points_in(database)
        .into_iter()
        .filter(|p| p.measurement == measurement)
        .collect();

    let columns: Vec<String> = if column == "*" {
        let keys: BTreeSet<String> = points
            .iter()
            .flat_map(|p| {
                p.tags
                    .iter()
                    .map(|t| t.key.clone())
                    .chain(p.fields.iter().map(|f| f.key.clone()))
            })
            .collect();
        keys.into_iter().collect()
    } else {
        vec![unquote(column)]
    };

    let rows: Vec<Value> = points
        .iter()
        .filter_map(|p| {
            let cells: Vec<Value> = columns.iter().map(|c| cell(p, c)).collect();
            if cells.iter().all(Value::is_null) {
                return None;
            }
            let mut row = vec![json!(p.timestamp)];
            row.extend(cells);
            Some(Value::Array(row))
        })
        .collect();

    if rows.is_empty() {
        return json!({ "statement_id": 0 });
    }

    let mut header = vec!["time".to_string()];
    header.extend(columns);
    json!({
        "statement_id": 0,
        "series": [{ "name": measurement, "columns": header, "values": rows }]
    })
}

fn cell(point: &Point, column: &str) -> Value {
    if let Some(value) = point.get_field(column) {
        return match value {
            FieldValue::Float(v) => json!(v),
            FieldValue::Integer(v) => json!(v),
            FieldValue::UnsignedInteger(v) => json!(v),
            FieldValue::String(v) => json!(v),
            FieldValue::Boolean(v) => json!(v),
        };
    }
    point.get_tag(column).map(|t| json!(t)).unwrap_or(Value::Null)
}

fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    match ident.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => ident.to_string(),
    }
}

/// A port nothing listens on
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
