//! Encoding of records into flat tabular rows and back.
//!
//! The store has no nested column type, so table-valued entries are written
//! as a JSON array inside a single text cell. Reading such a cell back is a
//! guess: any text that starts with `[` and ends with `]` is treated as an
//! encoded list, which also catches a plain text field that merely looks like
//! one. [`PersistedCell`] makes that guess an explicit step.

use crate::record::Record;
use serde_json::{Map, Value};

/// A list-valued entry serialized into one text cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedList {
    raw: String,
}

impl EncodedList {
    pub fn encode(items: &[Value]) -> Self {
        // Serializing a slice of `Value` cannot fail.
        let raw = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
        Self { raw }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn into_raw(self) -> String {
        self.raw
    }

    pub fn decode(&self) -> Result<Vec<Value>, serde_json::Error> {
        serde_json::from_str(&self.raw)
    }

    fn looks_encoded(text: &str) -> bool {
        text.starts_with('[') && text.ends_with(']')
    }
}

/// A cell read back from the store, classified before use.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedCell {
    Plain(Value),
    Encoded(EncodedList),
}

impl PersistedCell {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::String(text) if EncodedList::looks_encoded(&text) => {
                PersistedCell::Encoded(EncodedList::from_raw(text))
            }
            other => PersistedCell::Plain(other),
        }
    }

    /// Decoded array, or the raw text when it does not parse.
    pub fn into_value(self) -> Value {
        match self {
            PersistedCell::Plain(value) => value,
            PersistedCell::Encoded(list) => match list.decode() {
                Ok(items) => Value::Array(items),
                Err(_) => Value::String(list.into_raw()),
            },
        }
    }
}

/// A record in storage shape: ordered column name to scalar cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    cells: Vec<(String, Value)>,
}

impl FlatRow {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn values(&self) -> Vec<Value> {
        self.cells.iter().map(|(_, v)| store_cell(v)).collect()
    }

    /// Cells laid out along `header`; absent columns become empty text.
    pub fn aligned(&self, header: &[String]) -> Vec<Value> {
        header
            .iter()
            .map(|column| {
                self.get(column)
                    .map(store_cell)
                    .unwrap_or_else(|| Value::String(String::new()))
            })
            .collect()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.cells.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

fn store_cell(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        other => other.clone(),
    }
}

/// Arrays become [`EncodedList`] text, nested objects become JSON text and
/// scalars pass through.
pub fn flatten(record: &Record) -> FlatRow {
    let cells = record
        .iter()
        .map(|(key, value)| {
            let cell = match value {
                Value::Array(items) => Value::String(EncodedList::encode(items).into_raw()),
                Value::Object(_) => Value::String(value.to_string()),
                scalar => scalar.clone(),
            };
            (key.clone(), cell)
        })
        .collect();
    FlatRow { cells }
}

/// Best-effort inverse of [`flatten`] for a keyed row.
pub fn reconstruct(row: Map<String, Value>) -> Record {
    row.into_iter()
        .map(|(key, value)| (key, PersistedCell::classify(value).into_value()))
        .collect()
}

/// Pairs a header with one grid row. Missing trailing cells read as empty
/// text and unnamed columns are dropped.
pub fn row_to_map(header: &[String], cells: &[Value]) -> Map<String, Value> {
    header
        .iter()
        .enumerate()
        .filter(|(_, column)| !column.is_empty())
        .map(|(idx, column)| {
            let cell = cells
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            (column.clone(), cell)
        })
        .collect()
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
