//! Row <-> record mapping.
//!
//! External rows are snake_case JSON objects from one of two tables. The
//! `clients` table carries the full schema; `profiles` only has identity
//! fields (`first_name`, `last_name`, `role`) and cannot express lifecycle
//! state, so profile-sourced records are always active.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clients::{ClientPatch, ClientRecord, NewClient};
use crate::db::{Row, Table, fmt_ts, parse_ts};
use crate::error::MappingError;

/// A remote row tagged with the table it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRow {
    Clients(Row),
    Profiles(Row),
}

impl SourceRow {
    pub fn table(&self) -> Table {
        match self {
            Self::Clients(_) => Table::Clients,
            Self::Profiles(_) => Table::Profiles,
        }
    }

    pub fn row(&self) -> &Row {
        match self {
            Self::Clients(row) | Self::Profiles(row) => row,
        }
    }
}

/// `"A"` followed by the first three characters of the id, uppercased.
pub fn account_number(id: &str) -> String {
    let prefix: String = id.chars().take(3).collect();
    format!("A{}", prefix.to_uppercase())
}

/// Date portion of a raw `created_at` value, or empty.
pub fn date_registered(created_at: Option<&str>) -> String {
    created_at
        .and_then(|raw| raw.trim().split(['T', ' ']).next())
        .unwrap_or_default()
        .to_string()
}

fn text(row: &Row, field: &'static str) -> Result<String, MappingError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(MappingError::InvalidField {
            field,
            reason: format!("expected text, got {other}"),
        }),
    }
}

fn opt_text(row: &Row, field: &'static str) -> Result<Option<String>, MappingError> {
    let value = text(row, field)?;
    Ok((!value.is_empty()).then_some(value))
}

/// Like `opt_text`, but an empty string stays `Some("")`; only null is absent.
fn nullable_text(row: &Row, field: &'static str) -> Result<Option<String>, MappingError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        _ => text(row, field).map(Some),
    }
}

fn flag(row: &Row, field: &'static str) -> Result<bool, MappingError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(MappingError::InvalidField {
            field,
            reason: format!("expected boolean, got {other}"),
        }),
    }
}

fn tags(row: &Row) -> Result<Vec<String>, MappingError> {
    let items = match row.get("tags") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(MappingError::InvalidField {
                field: "tags",
                reason: format!("expected a list, got {other}"),
            });
        }
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(MappingError::InvalidField {
                field: "tags",
                reason: format!("expected text items, got {other}"),
            }),
        })
        .collect()
}

fn timestamp(row: &Row, field: &'static str) -> Result<Option<DateTime<Utc>>, MappingError> {
    let Some(raw) = opt_text(row, field)? else {
        return Ok(None);
    };
    parse_ts(&raw)
        .map(Some)
        .ok_or_else(|| MappingError::InvalidField {
            field,
            reason: format!("unparseable timestamp '{raw}'"),
        })
}

fn row_id(row: &Row, table: Table) -> Result<String, MappingError> {
    let id = match row.get("id") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(MappingError::MissingId {
            table: table.as_str(),
        });
    }
    Ok(id)
}

/// Build a `ClientRecord` from a tagged remote row.
pub fn to_internal(source: &SourceRow) -> Result<ClientRecord, MappingError> {
    let row = source.row();
    let id = row_id(row, source.table())?;

    let mut full_name = text(row, "full_name")?;
    if full_name.trim().is_empty() {
        let first = text(row, "first_name")?;
        let last = text(row, "last_name")?;
        full_name = format!("{} {}", first.trim(), last.trim()).trim().to_string();
    }

    let raw_created = opt_text(row, "created_at")?;
    let created_at = timestamp(row, "created_at")?;
    let updated_at = timestamp(row, "updated_at")?;

    let mut record = ClientRecord {
        account_number: account_number(&id),
        date_registered: date_registered(raw_created.as_deref()),
        id,
        user_id: None,
        full_name,
        email: text(row, "email")?,
        phone: text(row, "phone")?,
        company_name: String::new(),
        address: String::new(),
        notes: String::new(),
        tags: Vec::new(),
        assigned_attorney_id: None,
        is_dropped: false,
        dropped_date: None,
        dropped_reason: None,
        created_at,
        updated_at,
    };

    match source {
        SourceRow::Clients(row) => {
            record.user_id = nullable_text(row, "user_id")?;
            record.company_name = text(row, "company_name")?;
            record.address = text(row, "address")?;
            record.notes = text(row, "notes")?;
            record.tags = tags(row)?;
            record.assigned_attorney_id = nullable_text(row, "assigned_attorney_id")?;
            record.is_dropped = flag(row, "is_dropped")?;
            if record.is_dropped {
                record.dropped_date = timestamp(row, "dropped_date")?;
                record.dropped_reason = nullable_text(row, "dropped_reason")?;
            }
        }
        SourceRow::Profiles(_) => {
            // A profile row is keyed by the account it describes.
            record.user_id = Some(record.id.clone());
        }
    }

    Ok(record)
}

fn nullable(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn tag_list(tags: &[String]) -> Value {
    Value::Array(tags.iter().cloned().map(Value::String).collect())
}

/// Patch row holding only the fields present in `patch`.
pub fn to_external(patch: &ClientPatch) -> Row {
    let mut row = Row::new();
    let strings = [
        ("full_name", &patch.full_name),
        ("email", &patch.email),
        ("phone", &patch.phone),
        ("company_name", &patch.company_name),
        ("address", &patch.address),
        ("notes", &patch.notes),
    ];
    for (column, value) in strings {
        if let Some(value) = value {
            row.insert(column.to_string(), Value::String(value.clone()));
        }
    }
    if let Some(tags) = &patch.tags {
        row.insert("tags".to_string(), tag_list(tags));
    }
    if let Some(attorney) = &patch.assigned_attorney_id {
        row.insert(
            "assigned_attorney_id".to_string(),
            nullable(attorney.as_deref()),
        );
    }
    if let Some(user_id) = &patch.user_id {
        row.insert("user_id".to_string(), nullable(user_id.as_deref()));
    }
    row
}

/// Insert row for a new client. The store assigns id and timestamps.
pub fn new_client_to_external(client: &NewClient) -> Row {
    let mut row = Row::new();
    row.insert("full_name".into(), client.full_name.clone().into());
    row.insert("email".into(), client.email.clone().into());
    row.insert("phone".into(), client.phone.clone().into());
    row.insert("company_name".into(), client.company_name.clone().into());
    row.insert("address".into(), client.address.clone().into());
    row.insert("notes".into(), client.notes.clone().into());
    row.insert("tags".into(), tag_list(&client.tags));
    row.insert(
        "assigned_attorney_id".into(),
        nullable(client.assigned_attorney_id.as_deref()),
    );
    row.insert("user_id".into(), nullable(client.user_id.as_deref()));
    row.insert("is_dropped".into(), Value::Bool(false));
    row
}

/// Every persisted column of a record, in `clients` shape.
pub fn record_to_external(record: &ClientRecord) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), record.id.clone().into());
    row.insert("user_id".into(), nullable(record.user_id.as_deref()));
    row.insert("full_name".into(), record.full_name.clone().into());
    row.insert("email".into(), record.email.clone().into());
    row.insert("phone".into(), record.phone.clone().into());
    row.insert("company_name".into(), record.company_name.clone().into());
    row.insert("address".into(), record.address.clone().into());
    row.insert("notes".into(), record.notes.clone().into());
    row.insert("tags".into(), tag_list(&record.tags));
    row.insert(
        "assigned_attorney_id".into(),
        nullable(record.assigned_attorney_id.as_deref()),
    );
    row.insert("is_dropped".into(), Value::Bool(record.is_dropped));
    row.insert(
        "dropped_date".into(),
        record
            .dropped_date
            .as_ref()
            .map_or(Value::Null, |ts| Value::String(fmt_ts(ts))),
    );
    row.insert(
        "dropped_reason".into(),
        nullable(record.dropped_reason.as_deref()),
    );
    for (column, ts) in [("created_at", &record.created_at), ("updated_at", &record.updated_at)] {
        if let Some(ts) = ts {
            row.insert(column.into(), Value::String(fmt_ts(ts)));
        }
    }
    row
}

/// The single patch that moves a record into the dropped state.
pub fn drop_to_external(reason: &str, at: DateTime<Utc>) -> Row {
    let mut row = Row::new();
    row.insert("is_dropped".into(), Value::Bool(true));
    row.insert("dropped_date".into(), Value::String(fmt_ts(&at)));
    row.insert("dropped_reason".into(), Value::String(reason.to_string()));
    row
}

/// Identity account linked to a raw `clients` row, if any.
pub fn linked_account_id(row: &Row) -> Option<String> {
    row.get("user_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
