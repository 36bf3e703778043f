//! Decoding of the jobs API row encoding.
//!
//! The API returns rows as `{"f": [{"v": ...}, ...]}` with every scalar
//! rendered as a string. Decoding pairs each cell with its schema field and
//! produces JSON objects keyed by column name, with INT64/FLOAT64/BOOL
//! restored to native JSON types, REPEATED fields to arrays, and RECORD
//! fields to nested objects.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Result schema as returned by the jobs API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// Child fields for RECORD columns.
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

/// Decode raw API rows against the schema.
pub fn decode_rows(
    schema: &TableSchema,
    raw_rows: &[Value],
) -> Result<Vec<Map<String, Value>>, String> {
    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        rows.push(decode_row(&schema.fields, raw)?);
    }
    Ok(rows)
}

fn decode_row(fields: &[TableFieldSchema], raw: &Value) -> Result<Map<String, Value>, String> {
    let cells = raw
        .get("f")
        .and_then(|f| f.as_array())
        .ok_or_else(|| "row is missing the \"f\" cell array".to_string())?;
    if cells.len() != fields.len() {
        return Err(format!(
            "row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        ));
    }

    let mut row = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        let v = cell.get("v").unwrap_or(&Value::Null);
        row.insert(field.name.clone(), decode_cell(field, v)?);
    }
    Ok(row)
}

fn decode_cell(field: &TableFieldSchema, v: &Value) -> Result<Value, String> {
    if field.is_repeated() {
        let items = match v {
            Value::Null => return Ok(Value::Array(vec![])),
            Value::Array(items) => items,
            other => {
                return Err(format!(
                    "repeated field \"{}\" is not an array: {}",
                    field.name, other
                ))
            }
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let inner = item.get("v").unwrap_or(&Value::Null);
            out.push(decode_scalar(field, inner)?);
        }
        return Ok(Value::Array(out));
    }
    decode_scalar(field, v)
}

fn decode_scalar(field: &TableFieldSchema, v: &Value) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => {
            let nested = decode_row(&field.fields, v)?;
            Ok(Value::Object(nested))
        }
        "INTEGER" | "INT64" => {
            let s = as_str(field, v)?;
            // INT64 values outside the i64 range stay as strings.
            Ok(s.parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.to_string())))
        }
        "FLOAT" | "FLOAT64" => {
            let s = as_str(field, v)?;
            // NaN and Infinity have no JSON representation — keep the string.
            match s.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(s.to_string()))),
                _ => Ok(Value::String(s.to_string())),
            }
        }
        "BOOLEAN" | "BOOL" => {
            let s = as_str(field, v)?;
            match s {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                other => Err(format!(
                    "field \"{}\": \"{}\" is not a boolean",
                    field.name, other
                )),
            }
        }
        "TIMESTAMP" => {
            // Encoded as fractional epoch seconds; normalize to RFC 3339.
            let s = as_str(field, v)?;
            Ok(parse_epoch_timestamp(s)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or_else(|| Value::String(s.to_string())))
        }
        // STRING, BYTES, NUMERIC, DATE, TIME, DATETIME, GEOGRAPHY, JSON —
        // passed through as rendered.
        _ => Ok(Value::String(as_str(field, v)?.to_string())),
    }
}

fn as_str<'a>(field: &TableFieldSchema, v: &'a Value) -> Result<&'a str, String> {
    v.as_str()
        .ok_or_else(|| format!("field \"{}\": expected string cell, got {}", field.name, v))
}

fn parse_epoch_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let secs = s.parse::<f64>().ok()?;
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos)
}
