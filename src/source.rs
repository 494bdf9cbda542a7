use std::path::Path;

use anyhow::{bail, Context};
use tracing::warn;

use crate::models::{DocumentRecord, RecordBatch, SkippedDocument};

const ID_FIELDS: [&str; 2] = ["id", "document_id"];

/// Reads document records from a `.csv` or `.json` snapshot file.
///
/// Rows that cannot be read as records are returned in `rejected`; only an
/// unreadable file fails the load.
pub fn load_records(path: &Path) -> anyhow::Result<RecordBatch> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let batch = match extension.as_deref() {
        Some("csv") => load_csv(path)?,
        Some("json") => load_json(path)?,
        _ => bail!(
            "unsupported document file {} (expected .csv or .json)",
            path.display()
        ),
    };

    for rejected in batch.rejected.iter() {
        warn!(path = %path.display(), document_id = %rejected.document_id, reason = %rejected.reason, "rejecting row");
    }

    Ok(batch)
}

fn rejected_row(document_id: Option<&str>, row: usize, reason: String) -> SkippedDocument {
    SkippedDocument {
        document_id: document_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| format!("row {row}"), str::to_string),
        reason,
    }
}

fn load_csv(path: &Path) -> anyhow::Result<RecordBatch> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    let id_column = headers
        .iter()
        .position(|header| ID_FIELDS.contains(&header.trim()));
    let mut batch = RecordBatch::default();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                batch.rejected.push(rejected_row(None, row, format!("invalid row: {err}")));
                continue;
            }
        };

        match raw.deserialize::<DocumentRecord>(Some(&headers)) {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                let id = id_column.and_then(|column| raw.get(column));
                batch.rejected.push(rejected_row(id, row, format!("invalid row: {err}")));
            }
        }
    }

    Ok(batch)
}

fn load_json(path: &Path) -> anyhow::Result<RecordBatch> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)
        .with_context(|| format!("expected a JSON array of documents in {}", path.display()))?;
    let mut batch = RecordBatch::default();

    for (index, value) in values.into_iter().enumerate() {
        let id = ID_FIELDS
            .iter()
            .find_map(|field| value.get(*field).and_then(|id| id.as_str()))
            .map(str::to_string);

        match serde_json::from_value::<DocumentRecord>(value) {
            Ok(record) => batch.records.push(record),
            Err(err) => batch.rejected.push(rejected_row(
                id.as_deref(),
                index + 1,
                format!("invalid document: {err}"),
            )),
        }
    }

    Ok(batch)
}

pub fn filter_subject(mut batch: RecordBatch, subject: Option<&str>) -> RecordBatch {
    if let Some(wanted) = subject {
        batch
            .records
            .retain(|record| record.subject.as_deref() == Some(wanted));
    }
    batch
}
