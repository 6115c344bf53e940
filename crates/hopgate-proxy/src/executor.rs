//! Query execution against a database backend.
//!
//! The router hop hands the chosen [`BackendDescriptor`] and the raw query to
//! a [`QueryExecutor`]. The MySQL implementation opens a fresh connection per
//! query, runs it inside a transaction, converts the rows to JSON and closes
//! the connection again.

use crate::envelope::{
    Row, canonical_date, canonical_datetime, canonical_time, canonical_timestamp,
};
use crate::error::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use hopgate_core::BackendDescriptor;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::Duration;

/// Executes a query string on one backend.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, backend: &BackendDescriptor, query: &str) -> Result<Vec<Row>, RelayError>;
}

/// [`QueryExecutor`] for MySQL backends.
#[derive(Debug, Clone)]
pub struct MySqlExecutor {
    connect_timeout: Duration,
}

impl MySqlExecutor {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn connect_options(backend: &BackendDescriptor) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&backend.host)
            .port(backend.port)
            .username(&backend.username)
            .database(&backend.database);
        match backend.resolved_password() {
            Some(password) => options.password(&password),
            None => options,
        }
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn execute(&self, backend: &BackendDescriptor, query: &str) -> Result<Vec<Row>, RelayError> {
        let options = Self::connect_options(backend);
        let mut conn = tokio::time::timeout(self.connect_timeout, options.connect())
            .await
            .map_err(|_| RelayError::Timeout(self.connect_timeout))?
            .map_err(|e| RelayError::Execution(e.to_string()))?;

        let result = run_in_transaction(&mut conn, query).await;

        if let Err(e) = conn.close().await {
            tracing::debug!(backend = %backend.name, error = %e, "Failed to close backend connection cleanly");
        }
        result
    }
}

/// Run the query and commit. On error the transaction is dropped, which rolls
/// it back.
async fn run_in_transaction(conn: &mut MySqlConnection, query: &str) -> Result<Vec<Row>, RelayError> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| RelayError::Execution(e.to_string()))?;

    // Plain text protocol: MySQL refuses to prepare some statements
    // (LOCK TABLES, CREATE PROCEDURE, multi-statement batches).
    let rows = sqlx::Executor::fetch_all(&mut *tx, sqlx::raw_sql(query))
        .await
        .map_err(|e| RelayError::Execution(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| RelayError::Execution(e.to_string()))?;

    Ok(rows.iter().map(row_to_json).collect())
}

fn row_to_json(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), column_value(row, i)))
        .collect()
}

/// Date and time column types, which are rendered as canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temporal {
    Timestamp,
    DateTime,
    Date,
    Time,
}

impl Temporal {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "TIMESTAMP" => Some(Temporal::Timestamp),
            "DATETIME" => Some(Temporal::DateTime),
            "DATE" => Some(Temporal::Date),
            "TIME" => Some(Temporal::Time),
            _ => None,
        }
    }
}

/// Convert one column to a JSON scalar, turning dates and times into text.
fn column_value(row: &MySqlRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    // Decided by declared type first: TIMESTAMP also decodes as NaiveDateTime.
    if let Some(temporal) = Temporal::from_type_name(row.columns()[i].type_info().name())
        && let Some(text) = temporal_text(row, i, temporal)
    {
        return Value::from(text);
    }

    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return Value::from(String::from_utf8_lossy(&v).into_owned());
    }

    // DECIMAL and friends arrive as text.
    row.try_get_unchecked::<String, _>(i)
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn temporal_text(row: &MySqlRow, i: usize, temporal: Temporal) -> Option<String> {
    match temporal {
        Temporal::Timestamp => row
            .try_get::<DateTime<Utc>, _>(i)
            .ok()
            .map(|v| canonical_timestamp(&v)),
        Temporal::DateTime => row
            .try_get::<NaiveDateTime, _>(i)
            .ok()
            .map(|v| canonical_datetime(&v)),
        Temporal::Date => row.try_get::<NaiveDate, _>(i).ok().map(|v| canonical_date(&v)),
        Temporal::Time => row.try_get::<NaiveTime, _>(i).ok().map(|v| canonical_time(&v)),
    }
}
