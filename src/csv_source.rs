//! CSV source loading.
//!
//! Reads a configured CSV file into [`SourceRecord`]s, renders each record as
//! `"col: value | col: value"` text for embedding, and builds the metadata
//! record attached to every chunk of that row.

use anyhow::{bail, Context, Result};
use serde_json::{Number, Value};
use std::io::Read;

use crate::config::SourceConfig;
use crate::models::{Metadata, SourceRecord};

/// Metadata key holding the source name.
pub const SOURCE_TAG_KEY: &str = "source_table";

/// Load every row of the CSV file at `source.path`.
pub fn load_records(source: &SourceConfig) -> Result<Vec<SourceRecord>> {
    let file = std::fs::File::open(&source.path).with_context(|| {
        format!(
            "Failed to open source '{}' at {}",
            source.name,
            source.path.display()
        )
    })?;
    read_records(&source.name, file)
        .with_context(|| format!("Failed to read source '{}'", source.name))
}

/// Parse CSV data (with a header row) from any reader.
pub fn read_records<R: Read>(source_name: &str, reader: R) -> Result<Vec<SourceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("malformed row {}", line + 2))?;
        if row.len() > headers.len() {
            bail!(
                "malformed row {}: {} fields, but the header has {}",
                line + 2,
                row.len(),
                headers.len()
            );
        }
        // Short rows are padded with nulls.
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let value = row.get(i).map(infer_value).unwrap_or(Value::Null);
                (col.clone(), value)
            })
            .collect();
        records.push(SourceRecord {
            source: source_name.to_string(),
            fields,
        });
    }

    Ok(records)
}

/// Type a raw cell: empty → null, integer → integer, float → number,
/// anything else (including zero-padded codes) → string.
pub fn infer_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let zero_padded = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if !zero_padded {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Number(i.into());
        }
        if raw.contains('.') {
            if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                return Value::Number(n);
            }
        }
    }

    Value::String(raw.to_string())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a record as `"col: value | col: value | ..."`.
pub fn render_record(record: &SourceRecord) -> String {
    record
        .fields
        .iter()
        .map(|(col, value)| format!("{}: {}", col, display_value(value)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Metadata for every chunk of `record`: the source tag, then all columns.
/// A column named like the tag key overrides the tag.
pub fn record_metadata(record: &SourceRecord) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(
        SOURCE_TAG_KEY.to_string(),
        Value::String(record.source.clone()),
    );
    for (col, value) in &record.fields {
        meta.insert(col.clone(), value.clone());
    }
    meta
}
