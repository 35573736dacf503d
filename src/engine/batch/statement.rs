// SPDX-License-Identifier: Apache-2.0

//! Statement builder
//!
//! Turns grouped rows into parameterized T-SQL. Values are always bound as
//! parameters; only identifiers end up in the SQL text.

use crate::engine::batch::chunk::{chunk, chunk_by_parameters, DELETE_WINDOW, PARAMETER_LIMIT};
use crate::engine::batch::group::{ColumnSignature, GroupedRow, RowGroup};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::Value;

/// SQL text plus its named parameter bindings, in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Statement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, name: String, value: Value) {
        self.params.push((name, value));
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// SQL Server uses square brackets for identifier quoting.
fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Brackets a table name unless the caller already did.
///
/// `[dbo].[users]` is passed through untouched, which is how a
/// schema-qualified name is expressed; `dbo.users` becomes `[dbo.users]`.
pub fn escape_table_name(table: &str) -> String {
    let table = table.trim();
    if table.starts_with('[') && table.ends_with(']') {
        table.to_string()
    } else {
        quote_ident(table)
    }
}

/// `[c1], [c2], ...`
pub fn format_columns(signature: &ColumnSignature) -> String {
    signature
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One multi-row INSERT for a batch; parameters are named `r{row}v{value}`.
pub fn build_insert(table: &str, signature: &ColumnSignature, rows: &[GroupedRow]) -> Statement {
    let mut statement = Statement::new();
    let mut tuples = Vec::with_capacity(rows.len());

    for (r_index, row) in rows.iter().enumerate() {
        let mut placeholders = Vec::with_capacity(row.payload.field_count());
        for (v_index, value) in row.payload.values().enumerate() {
            let name = format!("r{}v{}", r_index, v_index);
            placeholders.push(format!("@{}", name));
            statement.bind(name, value.clone());
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    statement.sql = format!(
        "INSERT INTO {} ({}) VALUES {};",
        escape_table_name(table),
        format_columns(signature),
        tuples.join(", ")
    );
    statement
}

/// One UPDATE for a single row.
///
/// The match column in the WHERE clause is written exactly as supplied, unlike
/// the bracketed SET columns, so it must be a trusted identifier.
pub fn build_update(
    table: &str,
    signature: &ColumnSignature,
    row: &GroupedRow,
) -> EngineResult<Statement> {
    let key = row.update_key.as_deref().ok_or_else(|| {
        EngineError::validation(format!("No update key given for item {}", row.origin))
    })?;

    let mut statement = Statement::new();
    statement.bind(
        "condition".to_string(),
        row.payload.get(key).cloned().unwrap_or(Value::Null),
    );

    let mut set_values = Vec::with_capacity(signature.len());
    for (index, column) in signature.columns().iter().enumerate() {
        set_values.push(format!("{} = @v{}", quote_ident(column), index));
        statement.bind(
            format!("v{}", index),
            row.payload.get(column).cloned().unwrap_or(Value::Null),
        );
    }

    statement.sql = format!(
        "UPDATE {} SET {} WHERE {} = @condition;",
        escape_table_name(table),
        set_values.join(", "),
        key
    );
    Ok(statement)
}

/// `DELETE ... WHERE [key] IN (@v0, ...)` for one window of key values.
pub fn build_delete(table: &str, key: &str, values: &[Value]) -> Statement {
    let mut statement = Statement::new();
    let mut placeholders = Vec::with_capacity(values.len());

    for (index, value) in values.iter().enumerate() {
        let name = format!("v{}", index);
        placeholders.push(format!("@{}", name));
        statement.bind(name, value.clone());
    }

    statement.sql = format!(
        "DELETE FROM {} WHERE {} IN ({});",
        escape_table_name(table),
        quote_ident(key),
        placeholders.join(", ")
    );
    statement
}

/// INSERT statements for a whole group, one per parameter-limited batch.
pub fn insert_statements(group: &RowGroup) -> Vec<Statement> {
    chunk_by_parameters(&group.rows, PARAMETER_LIMIT)
        .into_iter()
        .map(|batch| build_insert(&group.table, &group.signature, batch))
        .collect()
}

/// One UPDATE per row of the group.
pub fn update_statements(group: &RowGroup) -> EngineResult<Vec<Statement>> {
    group
        .rows
        .iter()
        .map(|row| build_update(&group.table, &group.signature, row))
        .collect()
}

/// DELETE statements for a group keyed by a single delete-key column,
/// one per window of [`DELETE_WINDOW`] key values.
pub fn delete_statements(group: &RowGroup) -> Vec<Statement> {
    let key = group.signature.key();
    let values: Vec<Value> = group
        .rows
        .iter()
        .map(|row| row.payload.get(key).cloned().unwrap_or(Value::Null))
        .collect();

    chunk(&values, DELETE_WINDOW)
        .into_iter()
        .map(|window| build_delete(&group.table, key, window))
        .collect()
}
