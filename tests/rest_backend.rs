//! Integration tests for the HTTP remote store and identity provider.
//!
//! These tests start a fake of the hosted database's REST and admin-user
//! APIs on a random port and drive `RestBackend` / `RestIdentityProvider`
//! (and a full `ClientSession`) against it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query as QueryParams, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

use firmdesk::clients::{ClientSession, CreateClientRequest, NewClient};
use firmdesk::config::ClientsConfig;
use firmdesk::db::rest::RestBackend;
use firmdesk::db::{Filter, Order, Query, RemoteStore, Row, Table};
use firmdesk::error::{IdentityError, RemoteError};
use firmdesk::identity::rest::RestIdentityProvider;
use firmdesk::identity::{AccountMetadata, IdentityProvider, NewAccount};

const SERVICE_KEY: &str = "service-key-for-tests";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeState {
    tables: HashMap<String, Vec<Row>>,
    /// Tables answering 500 on every request.
    broken: Vec<String>,
    users: Vec<String>,
    deleted_users: Vec<String>,
    last_prefer: Option<String>,
    next_id: u32,
}

type Shared = Arc<Mutex<FakeState>>;

fn authorized(headers: &HeaderMap) -> bool {
    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    let expected_bearer = format!("Bearer {SERVICE_KEY}");
    apikey == Some(SERVICE_KEY) && bearer == Some(expected_bearer.as_str())
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_matches(row: &Row, params: &HashMap<String, String>) -> bool {
    params.iter().all(|(column, condition)| {
        if matches!(column.as_str(), "select" | "order" | "limit") {
            return true;
        }
        let value = row.get(column).unwrap_or(&Value::Null);
        match condition.strip_prefix("eq.") {
            Some(expected) => !value.is_null() && scalar(value) == expected,
            None if condition == "is.null" => value.is_null(),
            None => false,
        }
    })
}

/// Guard shared by all table routes: auth, breakage and existence.
fn table_guard(state: &FakeState, headers: &HeaderMap, table: &str) -> Option<Response> {
    if !authorized(headers) {
        return Some(error(StatusCode::UNAUTHORIZED, "Invalid API key"));
    }
    if state.broken.iter().any(|t| t == table) {
        return Some(error(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded"));
    }
    if !state.tables.contains_key(table) {
        return Some(error(
            StatusCode::NOT_FOUND,
            &format!("relation \"public.{table}\" does not exist"),
        ));
    }
    None
}

async fn select_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let state = state.lock().await;
    if let Some(rejection) = table_guard(&state, &headers, &table) {
        return rejection;
    }
    let mut rows: Vec<Row> = state.tables[&table]
        .iter()
        .filter(|row| row_matches(row, &params))
        .cloned()
        .collect();
    if let Some(column) = params.get("order").and_then(|o| o.strip_suffix(".desc")) {
        rows.sort_by(|a, b| {
            let left = a.get(column).map(scalar).unwrap_or_default();
            let right = b.get(column).map(scalar).unwrap_or_default();
            right.cmp(&left)
        });
    }
    if let Some(limit) = params.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        rows.truncate(limit);
    }
    Json(rows).into_response()
}

async fn insert_row(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(mut row): Json<Row>,
) -> Response {
    let mut state = state.lock().await;
    if let Some(rejection) = table_guard(&state, &headers, &table) {
        return rejection;
    }
    state.last_prefer = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.next_id += 1;
    let id = format!("{:08x}-0000-4000-8000-000000000000", state.next_id);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    row.entry("id").or_insert_with(|| Value::String(id));
    row.insert("created_at".to_string(), Value::String(now.clone()));
    row.insert("updated_at".to_string(), Value::String(now));
    state
        .tables
        .entry(table)
        .or_default()
        .push(row.clone());
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn update_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
    headers: HeaderMap,
    Json(patch): Json<Row>,
) -> Response {
    let mut state = state.lock().await;
    if let Some(rejection) = table_guard(&state, &headers, &table) {
        return rejection;
    }
    state.last_prefer = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut changed = Vec::new();
    for row in state.tables.entry(table).or_default().iter_mut() {
        if row_matches(row, &params) {
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            row.insert("updated_at".to_string(), Value::String(now.clone()));
            changed.push(row.clone());
        }
    }
    Json(changed).into_response()
}

async fn delete_rows(
    State(state): State<Shared>,
    Path(table): Path<String>,
    QueryParams(params): QueryParams<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().await;
    if let Some(rejection) = table_guard(&state, &headers, &table) {
        return rejection;
    }
    let rows = state.tables.entry(table).or_default();
    let (removed, kept): (Vec<Row>, Vec<Row>) =
        rows.drain(..).partition(|row| row_matches(row, &params));
    *rows = kept;
    Json(removed).into_response()
}

async fn create_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Invalid API key");
    }
    if body["email"] == "taken@x.com" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"msg": "A user with this email address has already been registered"})),
        )
            .into_response();
    }
    let mut state = state.lock().await;
    let id = format!("user-{}", state.users.len() + 1);
    state.users.push(id.clone());
    Json(json!({
        "id": id,
        "email": body["email"],
        "user_metadata": body["user_metadata"],
    }))
    .into_response()
}

async fn delete_user(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Invalid API key");
    }
    let mut state = state.lock().await;
    let Some(pos) = state.users.iter().position(|u| *u == id) else {
        return error(StatusCode::NOT_FOUND, "User not found");
    };
    state.users.remove(pos);
    state.deleted_users.push(id);
    Json(json!({})).into_response()
}

async fn start_fake(initial: FakeState) -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(initial));
    let app = Router::new()
        .route(
            "/rest/v1/{table}",
            get(select_rows)
                .post(insert_row)
                .patch(update_rows)
                .delete(delete_rows),
        )
        .route("/auth/v1/admin/users", post(create_user))
        .route("/auth/v1/admin/users/{id}", delete(delete_user))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake server");
    });
    (addr, state)
}

fn with_tables(names: &[&str]) -> FakeState {
    FakeState {
        tables: names
            .iter()
            .map(|name| ((*name).to_string(), Vec::new()))
            .collect(),
        ..Default::default()
    }
}

fn base_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}")).expect("base url")
}

fn key() -> SecretString {
    SecretString::from(SERVICE_KEY.to_string())
}

fn row(value: Value) -> Row {
    value.as_object().cloned().expect("object")
}

#[tokio::test]
async fn rest_backend_round_trips_rows() {
    let (addr, state) = start_fake(with_tables(&["clients", "profiles"])).await;
    let backend = RestBackend::new(&base_url(addr), &key(), TIMEOUT).expect("backend");

    let inserted = backend
        .insert(
            Table::Clients,
            &row(json!({"full_name": "Jane Doe", "email": "jane@x.com", "is_dropped": false, "tags": ["vip"]})),
        )
        .await
        .expect("insert");
    let id = inserted["id"].as_str().expect("id").to_string();
    assert_eq!(
        state.lock().await.last_prefer.as_deref(),
        Some("return=representation")
    );

    let found = backend
        .select(Table::Clients, &Query::by_id(&id))
        .await
        .expect("select");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["tags"], json!(["vip"]));

    let active = backend
        .select(
            Table::Clients,
            &Query::new()
                .filter(Filter::eq("is_dropped", false))
                .order(Order::desc("created_at")),
        )
        .await
        .expect("select active");
    assert_eq!(active.len(), 1);

    let updated = backend
        .update(Table::Clients, &id, &row(json!({"phone": "555-0100"})))
        .await
        .expect("update")
        .expect("row matched");
    assert_eq!(updated["phone"], "555-0100");

    assert!(
        backend
            .update(Table::Clients, "nope", &row(json!({"phone": "1"})))
            .await
            .expect("update")
            .is_none()
    );
    assert!(backend.delete(Table::Clients, &id).await.expect("delete"));
    assert!(!backend.delete(Table::Clients, &id).await.expect("delete"));
}

#[tokio::test]
async fn rest_backend_maps_http_failures() {
    let mut initial = with_tables(&["clients"]);
    initial.broken.push("clients".to_string());
    let (addr, _state) = start_fake(initial).await;

    let backend = RestBackend::new(&base_url(addr), &key(), TIMEOUT).expect("backend");
    let err = backend
        .select(Table::Clients, &Query::new())
        .await
        .expect_err("broken table");
    let RemoteError::Status { status, message } = err else {
        panic!("expected Status, got: {err:?}");
    };
    assert_eq!(status, 500);
    assert_eq!(message, "upstream exploded");

    let err = backend
        .select(Table::Profiles, &Query::new())
        .await
        .expect_err("missing table");
    assert!(matches!(err, RemoteError::Unavailable(_)));

    let wrong_key = RestBackend::new(
        &base_url(addr),
        &SecretString::from("wrong".to_string()),
        TIMEOUT,
    )
    .expect("backend");
    let err = wrong_key
        .select(Table::Profiles, &Query::new())
        .await
        .expect_err("unauthorized");
    assert!(matches!(err, RemoteError::Status { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn identity_provider_creates_and_deletes_accounts() {
    let (addr, state) = start_fake(with_tables(&[])).await;
    let provider = RestIdentityProvider::new(&base_url(addr), &key(), TIMEOUT).expect("provider");

    let account = NewAccount {
        email: "jane@x.com".to_string(),
        password: SecretString::from("pw-123456".to_string()),
        metadata: AccountMetadata::from_full_name("Jane Doe", "client"),
    };
    let id = provider.create_account(&account).await.expect("create");
    assert_eq!(id, "user-1");

    provider.delete_account(&id).await.expect("delete");
    provider
        .delete_account(&id)
        .await
        .expect("deleting a missing account is not an error");
    assert_eq!(state.lock().await.deleted_users, vec!["user-1".to_string()]);

    let taken = NewAccount {
        email: "taken@x.com".to_string(),
        ..account
    };
    let err = provider.create_account(&taken).await.expect_err("taken");
    let IdentityError::Rejected { status, message } = err else {
        panic!("expected Rejected, got: {err:?}");
    };
    assert_eq!(status, 422);
    assert!(message.contains("already been registered"));
}

fn clients_config() -> ClientsConfig {
    ClientsConfig {
        profiles_fallback: true,
        client_role: "client".to_string(),
        rollback_orphaned_accounts: false,
    }
}

#[tokio::test]
async fn session_over_rest_links_and_unlinks_accounts() {
    let (addr, state) = start_fake(with_tables(&["clients", "profiles"])).await;
    let base = base_url(addr);
    let remote = Arc::new(RestBackend::new(&base, &key(), TIMEOUT).expect("backend"));
    let identity = Arc::new(RestIdentityProvider::new(&base, &key(), TIMEOUT).expect("provider"));
    let session = ClientSession::new(remote, identity, &clients_config());

    let record = session
        .create_client(CreateClientRequest::with_password(
            NewClient::new("Jane Doe", "jane@x.com"),
            SecretString::from("pw-123456".to_string()),
        ))
        .await
        .expect("create");
    assert_eq!(record.user_id.as_deref(), Some("user-1"));
    assert_eq!(record.account_number, format!("A{}", &record.id[..3]).to_uppercase());

    let dropped = session
        .drop_client(&record.id, "non-payment")
        .await
        .expect("drop");
    assert!(dropped.is_dropped);

    assert!(session.reload().await);
    let snapshot = session.store().snapshot().await;
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.dropped.len(), 1);

    session.delete_client(&record.id).await.expect("delete");
    assert_eq!(state.lock().await.deleted_users, vec!["user-1".to_string()]);
    assert!(session.store().snapshot().await.is_empty());
}

#[tokio::test]
async fn session_over_rest_falls_back_when_clients_table_fails() {
    let mut initial = with_tables(&["clients", "profiles"]);
    initial.broken.push("clients".to_string());
    initial.tables.insert(
        "profiles".to_string(),
        vec![
            row(json!({"id": "p-1", "first_name": "Ann", "last_name": "Smith", "role": "client", "created_at": "2026-01-01T00:00:00Z"})),
            row(json!({"id": "p-2", "first_name": "Bo", "last_name": "Ng", "role": "client", "created_at": "2026-01-02T00:00:00Z"})),
            row(json!({"id": "p-3", "first_name": "Cy", "last_name": "Law", "role": "admin", "created_at": "2026-01-03T00:00:00Z"})),
        ],
    );
    let (addr, _state) = start_fake(initial).await;
    let remote = Arc::new(RestBackend::new(&base_url(addr), &key(), TIMEOUT).expect("backend"));
    let session = ClientSession::new(
        remote,
        Arc::new(firmdesk::identity::DisabledIdentityProvider),
        &clients_config(),
    );

    assert!(session.reload().await);
    let snapshot = session.store().snapshot().await;
    let names: Vec<&str> = snapshot
        .active
        .iter()
        .map(|r| r.full_name.as_str())
        .collect();
    assert_eq!(names, vec!["Bo Ng", "Ann Smith"]);
    assert!(snapshot.dropped.is_empty());
}
