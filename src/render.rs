//! Serialize exported records into the requested output format.

use serde_json::Value;

use crate::catalog::FormatId;
use crate::error::{ExportError, Result};
use crate::records::Record;

/// Render `records` with columns in `fields` order.
pub fn render(format: FormatId, fields: &[String], records: &[Record]) -> Result<Vec<u8>> {
    match format {
        FormatId::Csv => render_csv(fields, records),
        FormatId::Json => render_json(fields, records),
        FormatId::Jsonl => render_jsonl(fields, records),
    }
}

fn render_csv(fields: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| ExportError::Render(e.to_string()))?;

    for record in records {
        let row = fields.iter().map(|f| cell(record.get(f)));
        writer
            .write_record(row)
            .map_err(|e| ExportError::Render(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Render(e.to_string()))
}

fn render_json(fields: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let rows: Vec<Value> = records.iter().map(|r| ordered(fields, r)).collect();
    serde_json::to_vec_pretty(&rows).map_err(|e| ExportError::Render(e.to_string()))
}

fn render_jsonl(fields: &[String], records: &[Record]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, &ordered(fields, record))
            .map_err(|e| ExportError::Render(e.to_string()))?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Rebuild a record as a JSON object restricted to `fields`.
fn ordered(fields: &[String], record: &Record) -> Value {
    let mut object = serde_json::Map::new();
    for field in fields {
        object.insert(
            field.clone(),
            record.get(field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(object)
}

/// Flatten a JSON value into a CSV cell. Null becomes an empty cell.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
