use crate::db::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ColumnKind {
    Text,
    Bool,
    /// Stored as JSON text.
    Json,
}

const CLIENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("id", ColumnKind::Text),
    ("user_id", ColumnKind::Text),
    ("full_name", ColumnKind::Text),
    ("email", ColumnKind::Text),
    ("phone", ColumnKind::Text),
    ("company_name", ColumnKind::Text),
    ("address", ColumnKind::Text),
    ("notes", ColumnKind::Text),
    ("tags", ColumnKind::Json),
    ("assigned_attorney_id", ColumnKind::Text),
    ("is_dropped", ColumnKind::Bool),
    ("dropped_date", ColumnKind::Text),
    ("dropped_reason", ColumnKind::Text),
    ("created_at", ColumnKind::Text),
    ("updated_at", ColumnKind::Text),
];

const PROFILE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("id", ColumnKind::Text),
    ("first_name", ColumnKind::Text),
    ("last_name", ColumnKind::Text),
    ("full_name", ColumnKind::Text),
    ("email", ColumnKind::Text),
    ("phone", ColumnKind::Text),
    ("role", ColumnKind::Text),
    ("created_at", ColumnKind::Text),
    ("updated_at", ColumnKind::Text),
];

pub(super) const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS clients (\
        id TEXT PRIMARY KEY, \
        user_id TEXT, \
        full_name TEXT, \
        email TEXT, \
        phone TEXT, \
        company_name TEXT, \
        address TEXT, \
        notes TEXT, \
        tags TEXT NOT NULL DEFAULT '[]', \
        assigned_attorney_id TEXT, \
        is_dropped INTEGER NOT NULL DEFAULT 0, \
        dropped_date TEXT, \
        dropped_reason TEXT, \
        created_at TEXT NOT NULL, \
        updated_at TEXT NOT NULL)",
    "CREATE INDEX IF NOT EXISTS idx_clients_created_at ON clients (created_at DESC)",
    "CREATE TABLE IF NOT EXISTS profiles (\
        id TEXT PRIMARY KEY, \
        first_name TEXT, \
        last_name TEXT, \
        full_name TEXT, \
        email TEXT, \
        phone TEXT, \
        role TEXT NOT NULL DEFAULT 'user', \
        created_at TEXT NOT NULL, \
        updated_at TEXT NOT NULL)",
    "CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles (role, created_at DESC)",
];

pub(super) fn columns(table: Table) -> &'static [(&'static str, ColumnKind)] {
    match table {
        Table::Clients => CLIENT_COLUMNS,
        Table::Profiles => PROFILE_COLUMNS,
    }
}

pub(super) fn column_kind(table: Table, column: &str) -> Option<ColumnKind> {
    columns(table)
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, kind)| *kind)
}
