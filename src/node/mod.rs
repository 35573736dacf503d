// SPDX-License-Identifier: Apache-2.0

//! Node execution
//!
//! Ties the host-facing surface together: credentials pick an adapter, per
//! item parameters become row descriptors, and the chosen operation runs
//! through the batching core. Output records always carry `pairedItem`
//! links back to the inputs that produced them.

pub mod expression;
pub mod job;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::engine::batch::{QueueOptions, RowDescriptor, TableGroups};
use crate::engine::drivers::DEFAULT_MAX_CONNECTIONS;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::operations::{
    delete_operation, execute_sql_query_and_prepare_results, flatten_recordsets,
    insert_operation, update_operation,
};
use crate::engine::traits::SqlConnection;
use crate::engine::types::{
    generate_paired_item_data, ExecutionId, InputItem, JsonObject, OutputItem, PairedItem,
};

use expression::{resolve_query, ExpressionResolver};

/// Node version from which raw queries run once per item
pub const PER_ITEM_QUERY_VERSION: f64 = 1.1;

// ==================== Parameters ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    ExecuteQuery,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ExecuteQuery => "executeQuery",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executeQuery" => Ok(Operation::ExecuteQuery),
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(EngineError::config(format!("unknown operation '{}'", other))),
        }
    }
}

/// Parameters the host resolves for one input item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeParameters {
    pub table: String,
    /// Comma-separated column list
    pub columns: String,
    pub update_key: String,
    pub delete_key: String,
    pub query: String,
}

impl Default for NodeParameters {
    fn default() -> Self {
        Self {
            table: String::new(),
            columns: String::new(),
            update_key: "id".to_string(),
            delete_key: "id".to_string(),
            query: String::new(),
        }
    }
}

impl NodeParameters {
    fn descriptor(&self, operation: Operation) -> RowDescriptor {
        match operation {
            Operation::Update => {
                RowDescriptor::update(self.table.trim(), &self.columns, self.update_key.trim())
            }
            Operation::Delete => RowDescriptor::delete(self.table.trim(), &self.delete_key),
            Operation::Insert | Operation::ExecuteQuery => {
                RowDescriptor::insert(self.table.trim(), &self.columns)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeOptions {
    /// Turn failures into `{error}` records instead of aborting
    pub continue_on_fail: bool,
    pub node_version: f64,
    /// Bound on concurrent statements during bulk writes; unbounded when unset
    pub max_concurrency: Option<usize>,
    /// Pool size for password logins
    pub max_connections: u32,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            continue_on_fail: false,
            node_version: PER_ITEM_QUERY_VERSION,
            max_concurrency: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl NodeOptions {
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            max_concurrency: self.max_concurrency,
        }
    }

    fn per_item_queries(&self) -> bool {
        self.node_version >= PER_ITEM_QUERY_VERSION
    }
}

/// Resolves per-item parameters into row descriptors, in item order.
pub fn resolve_descriptors(
    operation: Operation,
    parameters: &[NodeParameters],
) -> Vec<RowDescriptor> {
    parameters.iter().map(|p| p.descriptor(operation)).collect()
}

// ==================== Execution ====================

/// Runs `operation` over `items` and returns the host output records.
///
/// `parameters` holds one entry per item. The connection is opened here and
/// always closed before returning, whether the run succeeds or not.
#[instrument(
    skip_all,
    fields(execution_id = %ExecutionId::new(), operation = %operation, items = items.len())
)]
pub async fn execute(
    connection: &mut dyn SqlConnection,
    operation: Operation,
    items: &[InputItem],
    parameters: &[NodeParameters],
    options: &NodeOptions,
    resolver: &dyn ExpressionResolver,
) -> EngineResult<Vec<OutputItem>> {
    if parameters.len() != items.len() {
        return Err(EngineError::config(format!(
            "{} items but {} parameter sets",
            items.len(),
            parameters.len()
        )));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let paired = generate_paired_item_data(items.len());

    if let Err(e) = connection.connect().await {
        close_quietly(connection).await;
        warn!(error = %e, kind = e.kind(), "Connect failed");
        return if options.continue_on_fail {
            Ok(vec![OutputItem::error(e.to_string(), paired)])
        } else {
            Err(e)
        };
    }

    if operation == Operation::ExecuteQuery && options.per_item_queries() {
        let mut output = Vec::new();
        for (item, params) in items.iter().zip(parameters) {
            let result = match resolve_query(&params.query, item, resolver) {
                Ok(sql) => {
                    execute_sql_query_and_prepare_results(&*connection, &sql, item.index).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(records) => output.extend(records),
                Err(e) if options.continue_on_fail => {
                    warn!(item = item.index, error = %e, "Query failed, continuing");
                    output.push(OutputItem::error(
                        e.to_string(),
                        vec![PairedItem { item: item.index }],
                    ));
                }
                Err(e) => {
                    close_quietly(connection).await;
                    return Err(e);
                }
            }
        }
        close_quietly(connection).await;
        return Ok(output);
    }

    let result =
        run_operation(&*connection, operation, items, parameters, options, resolver).await;
    let output = match result {
        Ok(output) => output,
        Err(e) if options.continue_on_fail => {
            warn!(error = %e, kind = e.kind(), "Operation failed, continuing");
            vec![OutputItem::error(e.to_string(), paired)]
        }
        Err(e) => {
            close_quietly(connection).await;
            return Err(e);
        }
    };

    close_quietly(connection).await;
    info!(records = output.len(), "Execution finished");
    Ok(output)
}

async fn run_operation(
    connection: &dyn SqlConnection,
    operation: Operation,
    items: &[InputItem],
    parameters: &[NodeParameters],
    options: &NodeOptions,
    resolver: &dyn ExpressionResolver,
) -> EngineResult<Vec<OutputItem>> {
    let paired = generate_paired_item_data(items.len());

    match operation {
        Operation::ExecuteQuery => {
            let sql = resolve_query(&parameters[0].query, &items[0], resolver)?;
            let outcome = connection.request()?.query(&sql).await?;
            Ok(flatten_recordsets(outcome.recordsets)
                .into_iter()
                .map(|row| OutputItem::new(row, paired.clone()))
                .collect())
        }
        Operation::Insert | Operation::Update => {
            let descriptors = resolve_descriptors(operation, parameters);
            let groups = TableGroups::build(items, &descriptors)?;
            if operation == Operation::Insert {
                insert_operation(connection, &groups, options.queue_options()).await?;
            } else {
                update_operation(connection, &groups, options.queue_options()).await?;
            }
            Ok(items
                .iter()
                .map(|item| OutputItem::for_item(item.json.clone(), item.index))
                .collect())
        }
        Operation::Delete => {
            let descriptors = resolve_descriptors(operation, parameters);
            let groups = TableGroups::build(items, &descriptors)?;
            let total = delete_operation(connection, &groups, options.queue_options()).await?;
            let mut json = JsonObject::new();
            json.insert("rowsAffected".to_string(), json!(total));
            Ok(vec![OutputItem::new(json, paired)])
        }
    }
}

async fn close_quietly(connection: &mut dyn SqlConnection) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close connection");
    }
}

// ==================== Credential Test ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub status: ConnectionStatus,
    pub message: String,
}

/// Opens and closes `connection` once, reporting the outcome instead of failing.
#[instrument(skip_all, fields(adapter = connection.adapter_id()))]
pub async fn test_connection(connection: &mut dyn SqlConnection) -> ConnectionTestResult {
    let result = match connection.connect().await {
        Ok(()) => connection.close().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ConnectionTestResult {
            status: ConnectionStatus::Ok,
            message: "Connection successful!".to_string(),
        },
        Err(e) => {
            warn!(error = %e, "Connection test failed");
            ConnectionTestResult {
                status: ConnectionStatus::Error,
                message: e.to_string(),
            }
        }
    }
}
