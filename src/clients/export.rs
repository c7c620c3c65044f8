//! CSV and JSON renderings of a roster snapshot.

use std::fmt;
use std::str::FromStr;

use crate::clients::{ClientPartition, ClientRecord};
use crate::db::fmt_ts;
use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

const CSV_HEADER: [&str; 14] = [
    "status",
    "id",
    "account_number",
    "full_name",
    "email",
    "phone",
    "company_name",
    "address",
    "tags",
    "assigned_attorney_id",
    "notes",
    "date_registered",
    "dropped_date",
    "dropped_reason",
];

fn csv_row(status: &str, record: &ClientRecord) -> [String; 14] {
    [
        status.to_string(),
        record.id.clone(),
        record.account_number.clone(),
        record.full_name.clone(),
        record.email.clone(),
        record.phone.clone(),
        record.company_name.clone(),
        record.address.clone(),
        record.tags.join(";"),
        record.assigned_attorney_id.clone().unwrap_or_default(),
        record.notes.clone(),
        record.date_registered.clone(),
        record.dropped_date.as_ref().map(fmt_ts).unwrap_or_default(),
        record.dropped_reason.clone().unwrap_or_default(),
    ]
}

fn render_csv(partition: &ClientPartition) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in &partition.active {
        writer.write_record(csv_row("active", record))?;
    }
    for record in &partition.dropped {
        writer.write_record(csv_row("dropped", record))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Render both partitions, active first.
pub fn render(partition: &ClientPartition, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => render_csv(partition),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(partition)?),
    }
}
