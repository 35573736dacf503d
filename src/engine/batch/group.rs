// SPDX-License-Identifier: Apache-2.0

//! Row grouping
//!
//! Input items may each target a different table and column list. Before any
//! SQL is built they are partitioned into `table -> column signature -> rows`
//! so that every group can be written with as few statements as possible,
//! while each row remembers which input item it came from.

use std::collections::BTreeMap;

use crate::engine::batch::chunk::ParameterCount;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{InputItem, Value};

/// Ordered column list parsed from a comma-separated string.
///
/// Names are trimmed but otherwise compared verbatim, so `"a, b"` and `"a,b"`
/// share a signature while `"b,a"` does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSignature {
    key: String,
    columns: Vec<String>,
}

impl ColumnSignature {
    pub fn parse(raw: &str) -> Self {
        let columns: Vec<String> = raw.split(',').map(|c| c.trim().to_string()).collect();
        let key = columns.join(",");
        Self { key, columns }
    }

    /// A single-column signature (used for delete keys). The name is taken
    /// whole, commas included.
    pub fn single(column: &str) -> Self {
        let column = column.trim().to_string();
        Self {
            key: column.clone(),
            columns: vec![column],
        }
    }

    /// Grouping key: trimmed names joined with `,`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Where one input item should be written, resolved before grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescriptor {
    pub table: String,
    pub columns: ColumnSignature,
    /// Match column for updates; `None` for inserts.
    pub update_key: Option<String>,
}

impl RowDescriptor {
    pub fn insert(table: impl Into<String>, columns: &str) -> Self {
        Self {
            table: table.into(),
            columns: ColumnSignature::parse(columns),
            update_key: None,
        }
    }

    pub fn update(table: impl Into<String>, columns: &str, update_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: ColumnSignature::parse(columns),
            update_key: Some(update_key.into()),
        }
    }

    /// Delete targets: the signature is the single delete-key column.
    pub fn delete(table: impl Into<String>, delete_key: &str) -> Self {
        Self {
            table: table.into(),
            columns: ColumnSignature::single(delete_key),
            update_key: None,
        }
    }
}

/// Selected fields of one input item, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPayload {
    fields: Vec<(String, Value)>,
}

impl RowPayload {
    /// Copies `properties` out of `item`; absent fields become NULL. A property
    /// named twice is kept once, at its first position.
    pub fn copy_from(item: &InputItem, properties: &[String]) -> Self {
        let mut payload = RowPayload::default();
        for property in properties {
            let value = item
                .json
                .get(property)
                .map(Value::from)
                .unwrap_or(Value::Null);
            payload.set(property, value);
        }
        payload
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A payload plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRow {
    /// Index of the originating input item
    pub origin: usize,
    pub payload: RowPayload,
    /// Column the update matches on; its value is carried in `payload`.
    pub update_key: Option<String>,
}

impl ParameterCount for GroupedRow {
    fn parameter_count(&self) -> usize {
        self.payload.field_count()
    }
}

/// All rows sharing one table and one column signature
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    pub table: String,
    pub signature: ColumnSignature,
    pub rows: Vec<GroupedRow>,
}

impl RowGroup {
    pub fn origins(&self) -> Vec<usize> {
        self.rows.iter().map(|row| row.origin).collect()
    }
}

/// `table -> column signature -> rows`, built once per execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableGroups {
    tables: BTreeMap<String, BTreeMap<String, RowGroup>>,
}

impl TableGroups {
    /// Groups `items` by their descriptors (one descriptor per item, same order).
    pub fn build(items: &[InputItem], descriptors: &[RowDescriptor]) -> EngineResult<Self> {
        if items.len() != descriptors.len() {
            return Err(EngineError::internal(format!(
                "{} items but {} row descriptors",
                items.len(),
                descriptors.len()
            )));
        }

        let mut groups = TableGroups::default();
        for (item, descriptor) in items.iter().zip(descriptors) {
            if descriptor.table.trim().is_empty() {
                return Err(EngineError::validation(format!(
                    "No table name given for item {}",
                    item.index
                )));
            }

            let mut properties = descriptor.columns.columns().to_vec();
            if let Some(key) = &descriptor.update_key {
                properties.push(key.clone());
            }

            let row = GroupedRow {
                origin: item.index,
                payload: RowPayload::copy_from(item, &properties),
                update_key: descriptor.update_key.clone(),
            };
            groups.push(&descriptor.table, &descriptor.columns, row);
        }
        Ok(groups)
    }

    fn push(&mut self, table: &str, signature: &ColumnSignature, row: GroupedRow) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .entry(signature.key().to_string())
            .or_insert_with(|| RowGroup {
                table: table.to_string(),
                signature: signature.clone(),
                rows: Vec::new(),
            })
            .rows
            .push(row);
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn group(&self, table: &str, signature: &str) -> Option<&RowGroup> {
        self.tables.get(table).and_then(|groups| groups.get(signature))
    }

    /// Every group, table by table.
    pub fn groups(&self) -> impl Iterator<Item = &RowGroup> {
        self.tables.values().flat_map(|groups| groups.values())
    }

    pub fn group_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn row_count(&self) -> usize {
        self.groups().map(|g| g.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(index: usize, value: serde_json::Value) -> InputItem {
        InputItem::new(index, value.as_object().cloned().unwrap())
    }

    #[test]
    fn signature_trims_but_keeps_order() {
        assert_eq!(ColumnSignature::parse("a, b").key(), "a,b");
        assert_eq!(ColumnSignature::parse(" a ,b ").key(), "a,b");
        assert_ne!(ColumnSignature::parse("b,a"), ColumnSignature::parse("a,b"));
        assert_eq!(ColumnSignature::parse("id, name").columns(), ["id", "name"]);
    }

    #[test]
    fn single_signature_keeps_commas_in_the_name() {
        let signature = ColumnSignature::single(" a,b ");
        assert_eq!(signature.key(), "a,b");
        assert_eq!(signature.columns(), ["a,b"]);
    }

    #[test]
    fn missing_fields_become_null() {
        let item = item(0, json!({ "id": 1 }));
        let payload = RowPayload::copy_from(&item, &["id".into(), "name".into()]);
        assert_eq!(payload.get("id"), Some(&Value::Int(1)));
        assert_eq!(payload.get("name"), Some(&Value::Null));
        assert_eq!(payload.field_count(), 2);
    }

    #[test]
    fn payload_follows_column_order_not_item_order() {
        let item = item(0, json!({ "name": "a", "id": 1, "extra": true }));
        let payload = RowPayload::copy_from(&item, &["id".into(), "name".into()]);
        let values: Vec<_> = payload.values().cloned().collect();
        assert_eq!(values, vec![Value::Int(1), Value::Text("a".into())]);
    }

    #[test]
    fn every_item_lands_in_exactly_one_group() {
        let items = vec![
            item(0, json!({ "id": 1 })),
            item(1, json!({ "id": 2 })),
            item(2, json!({ "id": 3, "name": "c" })),
            item(3, json!({ "id": 4 })),
        ];
        let descriptors = vec![
            RowDescriptor::insert("users", "id"),
            RowDescriptor::insert("users", " id "),
            RowDescriptor::insert("users", "id,name"),
            RowDescriptor::insert("audit", "id"),
        ];

        let groups = TableGroups::build(&items, &descriptors).unwrap();

        assert_eq!(groups.group_count(), 3);
        assert_eq!(groups.row_count(), 4);
        assert_eq!(groups.group("users", "id").unwrap().origins(), vec![0, 1]);
        assert_eq!(groups.group("users", "id,name").unwrap().origins(), vec![2]);
        assert_eq!(groups.group("audit", "id").unwrap().origins(), vec![3]);
        assert_eq!(groups.tables().collect::<Vec<_>>(), vec!["audit", "users"]);
    }

    #[test]
    fn update_key_value_travels_with_row() {
        let items = vec![item(0, json!({ "id": 7, "name": "x" }))];
        let descriptors = vec![RowDescriptor::update("users", "name", "id")];

        let groups = TableGroups::build(&items, &descriptors).unwrap();
        let row = &groups.group("users", "name").unwrap().rows[0];

        assert_eq!(row.update_key.as_deref(), Some("id"));
        assert_eq!(row.payload.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.payload.get("name"), Some(&Value::Text("x".into())));
    }

    #[test]
    fn descriptor_count_must_match_items() {
        let items = vec![item(0, json!({}))];
        assert!(TableGroups::build(&items, &[]).is_err());
    }

    #[test]
    fn blank_table_is_rejected() {
        let items = vec![item(0, json!({ "id": 1 }))];
        let err = TableGroups::build(&items, &[RowDescriptor::insert(" ", "id")]).unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
    }
}
