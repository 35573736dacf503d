// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the batching core, the adapters and the node layer
//!
//! Host items arrive as JSON objects. Values bound to SQL parameters are
//! normalized into [`Value`], and results travel back as JSON objects again.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A JSON object as exchanged with the host.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Identifier for one node execution, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A scalar bound to a statement parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Objects and arrays are bound as their JSON text.
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Json(other.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// One record received from the host, tagged with its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    pub index: usize,
    pub json: JsonObject,
}

impl InputItem {
    pub fn new(index: usize, json: JsonObject) -> Self {
        Self { index, json }
    }

    /// Tags a sequence of host records with their origin indices.
    pub fn from_records(records: Vec<JsonObject>) -> Vec<InputItem> {
        records
            .into_iter()
            .enumerate()
            .map(|(index, json)| InputItem { index, json })
            .collect()
    }
}

/// Back-reference from an output record to an input item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// One record handed back to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub json: JsonObject,
    #[serde(rename = "pairedItem")]
    pub paired_item: Vec<PairedItem>,
}

impl OutputItem {
    pub fn new(json: JsonObject, paired_item: Vec<PairedItem>) -> Self {
        Self { json, paired_item }
    }

    /// Output record paired with a single input item.
    pub fn for_item(json: JsonObject, item: usize) -> Self {
        Self::new(json, vec![PairedItem { item }])
    }

    /// `{ "error": message }` record, used when the caller continues on failure.
    pub fn error(message: impl Into<String>, paired_item: Vec<PairedItem>) -> Self {
        let mut json = JsonObject::new();
        json.insert("error".to_string(), serde_json::Value::String(message.into()));
        Self::new(json, paired_item)
    }
}

/// Pairs output positions `0..length` with the input item at the same index.
pub fn generate_paired_item_data(length: usize) -> Vec<PairedItem> {
    (0..length).map(|item| PairedItem { item }).collect()
}

/// Result of a single statement round trip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// Every result set returned, in order.
    pub recordsets: Vec<Vec<JsonObject>>,
    /// The first result set, or empty.
    pub recordset: Vec<JsonObject>,
    /// One count per statement in the batch.
    pub rows_affected: Vec<u64>,
    /// Output parameters (always empty for this connector).
    pub output: JsonObject,
}

impl QueryOutcome {
    pub fn from_recordsets(recordsets: Vec<Vec<JsonObject>>) -> Self {
        let rows_affected = recordsets.iter().map(|set| set.len() as u64).collect();
        let recordset = recordsets.first().cloned().unwrap_or_default();
        Self {
            recordsets,
            recordset,
            rows_affected,
            output: JsonObject::new(),
        }
    }

    pub fn with_rows_affected(rows_affected: Vec<u64>) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Sum of every rows-affected count in this outcome.
    pub fn total_rows_affected(&self) -> u64 {
        self.rows_affected.iter().sum()
    }
}
