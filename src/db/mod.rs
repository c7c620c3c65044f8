//! Remote store abstraction.
//!
//! Provides a backend-agnostic `RemoteStore` trait with the four generic
//! row operations the client layer needs. Three implementations exist:
//!
//! - `rest`: the hosted database, spoken to over its PostgREST-style HTTP API
//! - `libsql` (feature-gated): an embedded libSQL database for local use
//! - `memory`: in-process tables, used by tests and throwaway sessions
//!
//! Rows travel as JSON objects keyed by snake_case column names. Only the
//! client mapper interprets them.

#[cfg(feature = "libsql")]
pub mod libsql;
pub mod memory;
pub mod rest;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::config::{BackendKind, RemoteConfig};
use crate::error::{ConfigError, RemoteError};

/// A single remote row.
pub type Row = serde_json::Map<String, Value>;

/// Tables the client layer reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Purpose-built client schema; source of truth.
    Clients,
    /// Generic user-profile schema; degraded fallback for client-role users.
    Profiles,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Profiles => "profiles",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate. Equality is all the client layer needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// True when `row` satisfies the predicate.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq { column, value } => row.get(column) == Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Select parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lookup of a single row by primary key.
    pub fn by_id(id: &str) -> Self {
        Self::new().filter(Filter::eq("id", id)).limit(1)
    }
}

/// Generic remote row store.
///
/// `update` returns `None` and `delete` returns `false` when no row has the
/// given id; every other failure is a `RemoteError`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, RemoteError>;
    async fn insert(&self, table: Table, row: &Row) -> Result<Row, RemoteError>;
    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: &Row,
    ) -> Result<Option<Row>, RemoteError>;
    async fn delete(&self, table: Table, id: &str) -> Result<bool, RemoteError>;
}

/// Create the configured remote store backend.
pub async fn connect_from_config(
    config: &RemoteConfig,
) -> Result<Arc<dyn RemoteStore>, ConfigError> {
    match config.backend {
        BackendKind::Rest => {
            let (url, key) = config.rest_credentials()?;
            let backend = rest::RestBackend::new(url, key, config.request_timeout)
                .map_err(|e| ConfigError::InvalidValue {
                    key: "FIRMDESK_REMOTE_URL".to_string(),
                    message: e.to_string(),
                })?;
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "libsql")]
        BackendKind::LibSql => {
            let backend = libsql::LibSqlBackend::new_local(&config.libsql_path)
                .await
                .map_err(|e| ConfigError::InvalidValue {
                    key: "FIRMDESK_LIBSQL_PATH".to_string(),
                    message: e.to_string(),
                })?;
            backend
                .run_migrations()
                .await
                .map_err(|e| ConfigError::InvalidValue {
                    key: "FIRMDESK_LIBSQL_PATH".to_string(),
                    message: format!("migrations failed: {e}"),
                })?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "libsql"))]
        BackendKind::LibSql => Err(ConfigError::InvalidValue {
            key: "FIRMDESK_BACKEND".to_string(),
            message: "libsql backend not compiled in; enable the 'libsql' feature".to_string(),
        }),
        BackendKind::Memory => Ok(Arc::new(memory::MemoryBackend::new())),
    }
}

/// Format a timestamp the way the local backends store it.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp: RFC 3339, Postgres text output, or naive UTC.
pub(crate) fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres text output without the `T` separator.
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Sort rows on a text column. Values that parse as timestamps compare as
/// instants, so `...00Z` and `...00.000000Z` are equal. Stable, so ties keep
/// insertion order.
pub(crate) fn sort_rows(rows: &mut [Row], order: &Order) {
    // Unparseable values sort before timestamps, among themselves as text.
    let key = |row: &Row| {
        let raw = row.get(&order.column).and_then(Value::as_str).unwrap_or("");
        match parse_ts(raw) {
            Some(ts) => (Some(ts), String::new()),
            None => (None, raw.to_string()),
        }
    };
    rows.sort_by(|a, b| {
        let ordering = key(a).cmp(&key(b));
        if order.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn eq_filter_matches_exact_value_only() {
        let filter = Filter::eq("role", "client");
        assert!(filter.matches(&row(json!({"role": "client"}))));
        assert!(!filter.matches(&row(json!({"role": "attorney"}))));
        assert!(!filter.matches(&row(json!({}))));
    }

    #[test]
    fn sort_rows_descending_keeps_ties_stable() {
        let mut rows = vec![
            row(json!({"id": "a", "created_at": "2026-01-01T00:00:00Z"})),
            row(json!({"id": "b", "created_at": "2026-02-01T00:00:00Z"})),
            row(json!({"id": "c", "created_at": "2026-01-01T00:00:00Z"})),
        ];
        sort_rows(&mut rows, &Order::desc("created_at"));
        let ids: Vec<&str> = rows
            .iter()
            .map(|r| r["id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn sort_rows_compares_timestamps_as_instants() {
        let mut rows = vec![
            row(json!({"id": "seeded", "created_at": "2026-01-01T00:00:00Z"})),
            row(json!({"id": "stored", "created_at": "2026-01-01T00:00:00.000000Z"})),
            row(json!({"id": "later", "created_at": "2026-01-01T00:00:00.500000Z"})),
            row(json!({"id": "pg", "created_at": "2026-01-01 00:00:01+00:00"})),
        ];
        sort_rows(&mut rows, &Order::desc("created_at"));
        let ids: Vec<&str> = rows
            .iter()
            .map(|r| r["id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec!["pg", "later", "seeded", "stored"]);
    }

    #[test]
    fn by_id_query_limits_to_one_row() {
        let query = Query::by_id("abc");
        assert_eq!(query.limit, Some(1));
        assert_eq!(query.filters, vec![Filter::eq("id", "abc")]);
    }
}
