// SPDX-License-Identifier: Apache-2.0

//! Write and query operations
//!
//! Each write operation is a thin pairing of a statement builder with the
//! queue executor. The raw query path shapes a [`QueryOutcome`] into host
//! records.

use serde_json::json;
use tracing::{debug, instrument};

use crate::engine::batch::queue::{execute_query_queue, GroupOutcome, QueueOptions};
use crate::engine::batch::statement::{delete_statements, insert_statements, update_statements};
use crate::engine::batch::TableGroups;
use crate::engine::error::EngineResult;
use crate::engine::traits::SqlConnection;
use crate::engine::types::{JsonObject, OutputItem, QueryOutcome};

/// Inserts every group, one multi-row INSERT per parameter-limited batch.
#[instrument(skip_all, fields(groups = groups.group_count(), rows = groups.row_count()))]
pub async fn insert_operation(
    connection: &dyn SqlConnection,
    groups: &TableGroups,
    options: QueueOptions,
) -> EngineResult<Vec<GroupOutcome>> {
    execute_query_queue(connection, groups, options, |group| Ok(insert_statements(group))).await
}

/// Updates every row with its own UPDATE statement.
#[instrument(skip_all, fields(groups = groups.group_count(), rows = groups.row_count()))]
pub async fn update_operation(
    connection: &dyn SqlConnection,
    groups: &TableGroups,
    options: QueueOptions,
) -> EngineResult<Vec<GroupOutcome>> {
    execute_query_queue(connection, groups, options, update_statements).await
}

/// Deletes by key in windows of 1000 and returns the summed affected rows.
///
/// `groups` must have been built from delete descriptors, so that each
/// signature is a single delete-key column.
#[instrument(skip_all, fields(groups = groups.group_count(), rows = groups.row_count()))]
pub async fn delete_operation(
    connection: &dyn SqlConnection,
    groups: &TableGroups,
    options: QueueOptions,
) -> EngineResult<u64> {
    let results =
        execute_query_queue(connection, groups, options, |group| Ok(delete_statements(group)))
            .await?;
    let total = results.iter().map(GroupOutcome::total_rows_affected).sum();
    debug!(rows_affected = total, "Delete finished");
    Ok(total)
}

/// Concatenates every result set into one list of rows.
pub fn flatten_recordsets(recordsets: Vec<Vec<JsonObject>>) -> Vec<JsonObject> {
    recordsets.into_iter().flatten().collect()
}

/// Shapes a raw query outcome into host records paired with `item_index`:
/// result rows if there are any, else one status record per rows-affected
/// count, else a single generic success record.
pub fn prepare_query_results(outcome: QueryOutcome, item_index: usize) -> Vec<OutputItem> {
    let QueryOutcome {
        recordsets,
        rows_affected,
        ..
    } = outcome;

    if !recordsets.is_empty() {
        return flatten_recordsets(recordsets)
            .into_iter()
            .map(|row| OutputItem::for_item(row, item_index))
            .collect();
    }

    if !rows_affected.is_empty() {
        return rows_affected
            .into_iter()
            .enumerate()
            .map(|(idx, affected)| {
                OutputItem::for_item(
                    as_object(json!({
                        "message": format!("Query {} executed successfully", idx + 1),
                        "rowsAffected": affected,
                    })),
                    item_index,
                )
            })
            .collect();
    }

    vec![OutputItem::for_item(
        as_object(json!({ "message": "Query executed successfully, but no rows were affected" })),
        item_index,
    )]
}

/// Runs one raw query and shapes its outcome for the host.
#[instrument(skip(connection, raw_query), fields(item = item_index))]
pub async fn execute_sql_query_and_prepare_results(
    connection: &dyn SqlConnection,
    raw_query: &str,
    item_index: usize,
) -> EngineResult<Vec<OutputItem>> {
    let outcome = connection.request()?.query(raw_query).await?;
    Ok(prepare_query_results(outcome, item_index))
}

fn as_object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}
