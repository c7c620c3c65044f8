//! HTTP backend for the hosted database (PostgREST dialect).
//!
//! Each table is exposed at `{base}/rest/v1/{table}`. Filters are encoded as
//! `column=eq.value`, ordering as `order=column.desc`, and writes ask for the
//! affected rows back with `Prefer: return=representation` so update/delete
//! can tell "no such id" apart from success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

use crate::db::{Filter, Query, RemoteStore, Row, Table};
use crate::error::RemoteError;

const RETURN_REPRESENTATION: &str = "return=representation";

/// Append path segments to a base URL, keeping any path prefix it carries.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| format!("'{base}' cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(text) = map.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate a `Query` into PostgREST query-string pairs.
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } if value.is_null() => {
                params.push((column.clone(), "is.null".to_string()));
            }
            Filter::Eq { column, value } => {
                params.push((column.clone(), format!("eq.{}", scalar_text(value))));
            }
        }
    }
    if let Some(order) = &query.order {
        let direction = if order.descending { "desc" } else { "asc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn id_param(id: &str) -> [(String, String); 1] {
    [("id".to_string(), format!("eq.{id}"))]
}

pub struct RestBackend {
    client: reqwest::Client,
    base: Url,
    key: SecretString,
}

impl RestBackend {
    pub fn new(base: &Url, key: &SecretString, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base: base.clone(),
            key: key.clone(),
        })
    }

    fn request(&self, method: Method, table: Table) -> Result<RequestBuilder, RemoteError> {
        let url = endpoint(&self.base, &["rest", "v1", table.as_str()])
            .map_err(RemoteError::Connection)?;
        Ok(self
            .client
            .request(method, url)
            .header("apikey", self.key.expose_secret())
            .bearer_auth(self.key.expose_secret()))
    }

    async fn check(table: Table, response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::Unavailable(format!(
                "{}: {}",
                table,
                error_message(&body)
            )));
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn rows(table: Table, response: Response) -> Result<Vec<Row>, RemoteError> {
        let response = Self::check(table, response).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }
}

#[async_trait]
impl RemoteStore for RestBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, RemoteError> {
        tracing::debug!(table = %table, filters = query.filters.len(), "remote select");
        let response = self
            .request(Method::GET, table)?
            .query(&query_params(query))
            .send()
            .await?;
        Self::rows(table, response).await
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, RemoteError> {
        tracing::debug!(table = %table, "remote insert");
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", RETURN_REPRESENTATION)
            .json(row)
            .send()
            .await?;
        Self::rows(table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Serialization(format!("insert into {table} returned no row")))
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: &Row,
    ) -> Result<Option<Row>, RemoteError> {
        tracing::debug!(table = %table, id = %id, "remote update");
        let response = self
            .request(Method::PATCH, table)?
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&id_param(id))
            .json(patch)
            .send()
            .await?;
        Ok(Self::rows(table, response).await?.into_iter().next())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<bool, RemoteError> {
        tracing::debug!(table = %table, id = %id, "remote delete");
        let response = self
            .request(Method::DELETE, table)?
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&id_param(id))
            .send()
            .await?;
        Ok(!Self::rows(table, response).await?.is_empty())
    }
}
