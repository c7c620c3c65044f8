//! In-process remote store.
//!
//! Mirrors the hosted store's assignment rules (UUID ids, RFC 3339
//! `created_at`/`updated_at`) so the client layer behaves the same against
//! it. Nothing is persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{Query, RemoteStore, Row, Table, fmt_ts, sort_rows};
use crate::error::RemoteError;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows verbatim, bypassing id/timestamp assignment.
    pub async fn seed(&self, table: Table, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write().await;
        tables.entry(table).or_default().extend(rows);
    }

    pub async fn row_count(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .get(&table)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, RemoteError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = &query.order {
            sort_rows(&mut rows, order);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, RemoteError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();

        let mut stored = row.clone();
        let id = match row_id(&stored) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        if rows.iter().any(|existing| row_id(existing) == Some(id.as_str())) {
            return Err(RemoteError::Query(format!(
                "duplicate key value violates unique constraint on {table}.id ({id})"
            )));
        }
        let now = fmt_ts(&Utc::now());
        stored.insert("id".to_string(), Value::String(id));
        stored
            .entry("created_at")
            .or_insert_with(|| Value::String(now.clone()));
        stored.insert("updated_at".to_string(), Value::String(now));

        rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: &Row,
    ) -> Result<Option<Row>, RemoteError> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
        else {
            return Ok(None);
        };

        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            row.insert(key.clone(), value.clone());
        }
        row.insert(
            "updated_at".to_string(),
            Value::String(fmt_ts(&Utc::now())),
        );
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool, RemoteError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| row_id(row) != Some(id));
        Ok(rows.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::{Filter, Order};

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let backend = MemoryBackend::new();
        let stored = backend
            .insert(Table::Clients, &row(json!({"full_name": "Jane Doe"})))
            .await
            .expect("insert");

        let id = stored["id"].as_str().expect("id");
        assert!(Uuid::parse_str(id).is_ok());
        assert!(stored["created_at"].is_string());
        assert_eq!(stored["created_at"], stored["updated_at"]);
        assert_eq!(backend.row_count(Table::Clients).await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let backend = MemoryBackend::new();
        let first = row(json!({"id": "c-1"}));
        backend.insert(Table::Clients, &first).await.expect("first");
        let err = backend
            .insert(Table::Clients, &first)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RemoteError::Query(_)));
    }

    #[tokio::test]
    async fn select_filters_orders_and_limits() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::Profiles,
                [
                    row(json!({"id": "p-1", "role": "client", "created_at": "2026-01-01T00:00:00Z"})),
                    row(json!({"id": "p-2", "role": "attorney", "created_at": "2026-03-01T00:00:00Z"})),
                    row(json!({"id": "p-3", "role": "client", "created_at": "2026-02-01T00:00:00Z"})),
                ],
            )
            .await;

        let query = Query::new()
            .filter(Filter::eq("role", "client"))
            .order(Order::desc("created_at"));
        let rows = backend.select(Table::Profiles, &query).await.expect("select");
        let ids: Vec<&str> = rows.iter().filter_map(row_id).collect();
        assert_eq!(ids, vec!["p-3", "p-1"]);

        let limited = backend
            .select(Table::Profiles, &query.clone().limit(1))
            .await
            .expect("select");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn update_merges_patch_but_never_rewrites_id() {
        let backend = MemoryBackend::new();
        backend
            .seed(Table::Clients, [row(json!({"id": "c-1", "email": "old@x.com"}))])
            .await;

        let updated = backend
            .update(
                Table::Clients,
                "c-1",
                &row(json!({"id": "hijack", "email": "new@x.com"})),
            )
            .await
            .expect("update")
            .expect("row exists");
        assert_eq!(updated["id"], "c-1");
        assert_eq!(updated["email"], "new@x.com");
        assert!(updated["updated_at"].is_string());

        let missing = backend
            .update(Table::Clients, "nope", &Row::new())
            .await
            .expect("update");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_matched() {
        let backend = MemoryBackend::new();
        backend
            .seed(Table::Clients, [row(json!({"id": "c-1"}))])
            .await;
        assert!(backend.delete(Table::Clients, "c-1").await.expect("delete"));
        assert!(!backend.delete(Table::Clients, "c-1").await.expect("delete"));
        assert!(!backend.delete(Table::Profiles, "c-1").await.expect("delete"));
    }
}
