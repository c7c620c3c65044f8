//! libSQL backend for local, single-user deployments.
//!
//! The two tables are created by `run_migrations`. Rows are exchanged as JSON
//! objects like every other backend; column names are checked against a
//! per-table whitelist before they reach SQL, so row keys can never inject.

mod schema;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::params::Params;
use libsql::{Connection, Database, Value as SqlValue};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{Filter, Query, RemoteStore, Row, Table, fmt_ts};
use crate::error::RemoteError;

use schema::{ColumnKind, MIGRATIONS, column_kind, columns};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    /// Open (or create) a database file.
    pub async fn new_local(path: &Path) -> Result<Self, RemoteError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            return Err(RemoteError::Connection(format!(
                "failed to create database directory {parent:?}: {e}"
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        Ok(Self { db })
    }

    pub async fn connect(&self) -> Result<Connection, RemoteError> {
        self.db
            .connect()
            .map_err(|e| RemoteError::Connection(e.to_string()))
    }

    pub async fn run_migrations(&self) -> Result<(), RemoteError> {
        let conn = self.connect().await?;
        for statement in MIGRATIONS {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    async fn fetch_by_id(
        &self,
        conn: &Connection,
        table: Table,
        id: &str,
    ) -> Result<Option<Row>, RemoteError> {
        let (sql, params) = select_sql(table, &Query::by_id(id))?;
        let mut rows = conn.query(&sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(sql_row_to_json(table, &row)?)),
            None => Ok(None),
        }
    }
}

fn unknown_column(table: Table, column: &str) -> RemoteError {
    RemoteError::Query(format!("column '{column}' does not exist on {table}"))
}

fn known_column(table: Table, column: &str) -> Result<ColumnKind, RemoteError> {
    column_kind(table, column).ok_or_else(|| unknown_column(table, column))
}

fn json_to_sql(kind: ColumnKind, column: &str, value: &Value) -> Result<SqlValue, RemoteError> {
    let invalid = || {
        RemoteError::Serialization(format!("unsupported value for column '{column}': {value}"))
    };
    match (kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (ColumnKind::Bool, Value::Number(n)) => n.as_i64().map(SqlValue::Integer).ok_or_else(invalid),
        (ColumnKind::Json, other) => Ok(SqlValue::Text(serde_json::to_string(other)?)),
        _ => Err(invalid()),
    }
}

fn sql_to_json(kind: ColumnKind, column: &str, value: SqlValue) -> Result<Value, RemoteError> {
    match (kind, value) {
        (_, SqlValue::Null) => Ok(Value::Null),
        (ColumnKind::Bool, SqlValue::Integer(i)) => Ok(Value::Bool(i != 0)),
        (ColumnKind::Json, SqlValue::Text(raw)) => {
            if raw.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&raw).map_err(|e| {
                RemoteError::Serialization(format!("invalid JSON in column '{column}': {e}"))
            })
        }
        (_, SqlValue::Text(s)) => Ok(Value::String(s)),
        (_, SqlValue::Integer(i)) => Ok(Value::from(i)),
        (_, SqlValue::Real(f)) => Ok(Value::from(f)),
        (_, SqlValue::Blob(_)) => Err(RemoteError::Serialization(format!(
            "unexpected blob in column '{column}'"
        ))),
    }
}

fn sql_row_to_json(table: Table, row: &libsql::Row) -> Result<Row, RemoteError> {
    let mut out = Row::new();
    for (idx, (name, kind)) in columns(table).iter().enumerate() {
        let idx = i32::try_from(idx)
            .map_err(|_| RemoteError::Serialization("column index overflow".to_string()))?;
        let value = row.get_value(idx)?;
        out.insert((*name).to_string(), sql_to_json(*kind, name, value)?);
    }
    Ok(out)
}

fn select_sql(table: Table, query: &Query) -> Result<(String, Params), RemoteError> {
    let column_list = columns(table)
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("SELECT {column_list} FROM {table}");

    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => {
                let kind = known_column(table, column)?;
                if value.is_null() {
                    clauses.push(format!("{column} IS NULL"));
                } else {
                    values.push(json_to_sql(kind, column, value)?);
                    clauses.push(format!("{column} = ?{}", values.len()));
                }
            }
        }
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if let Some(order) = &query.order {
        known_column(table, &order.column)?;
        let direction = if order.descending { "DESC" } else { "ASC" };
        // rowid keeps ties in insertion order
        sql.push_str(&format!(
            " ORDER BY {} {direction}, rowid ASC",
            order.column
        ));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    Ok((sql, Params::Positional(values)))
}

#[async_trait]
impl RemoteStore for LibSqlBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, RemoteError> {
        let (sql, params) = select_sql(table, query)?;
        let conn = self.connect().await?;
        let mut rows = conn.query(&sql, params).await?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(sql_row_to_json(table, &row)?);
        }
        Ok(out)
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, RemoteError> {
        let now = fmt_ts(&Utc::now());
        let mut stored = row.clone();
        if !matches!(stored.get("id"), Some(Value::String(_))) {
            stored.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        stored
            .entry("created_at")
            .or_insert_with(|| Value::String(now.clone()));
        stored.insert("updated_at".to_string(), Value::String(now));

        let mut names = Vec::with_capacity(stored.len());
        let mut values = Vec::with_capacity(stored.len());
        for (key, value) in &stored {
            let kind = known_column(table, key)?;
            names.push(key.as_str());
            values.push(json_to_sql(kind, key, value)?);
        }
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            names.join(", ")
        );

        let conn = self.connect().await?;
        conn.execute(&sql, Params::Positional(values)).await?;

        let id = stored
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.fetch_by_id(&conn, table, &id)
            .await?
            .ok_or_else(|| RemoteError::Query(format!("failed to load inserted {table} row")))
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: &Row,
    ) -> Result<Option<Row>, RemoteError> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (key, value) in patch {
            if key == "id" || key == "updated_at" {
                continue;
            }
            let kind = known_column(table, key)?;
            values.push(json_to_sql(kind, key, value)?);
            assignments.push(format!("{key} = ?{}", values.len()));
        }
        values.push(SqlValue::Text(fmt_ts(&Utc::now())));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(SqlValue::Text(id.to_string()));
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let conn = self.connect().await?;
        let affected = conn.execute(&sql, Params::Positional(values)).await?;
        if affected == 0 {
            return Ok(None);
        }
        self.fetch_by_id(&conn, table, id).await
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool, RemoteError> {
        let conn = self.connect().await?;
        let sql = format!("DELETE FROM {table} WHERE id = ?1");
        let deleted = conn
            .execute(&sql, Params::Positional(vec![SqlValue::Text(id.to_string())]))
            .await?;
        Ok(deleted > 0)
    }
}
