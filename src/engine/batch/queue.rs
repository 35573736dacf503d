// SPDX-License-Identifier: Apache-2.0

//! Queued fan-out execution
//!
//! Every statement of every group is issued at once and the executor waits
//! for all of them. The first failure aborts the whole fan-out; statements
//! still in flight are dropped and no partial result is reported.

use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::engine::batch::group::{RowGroup, TableGroups};
use crate::engine::batch::statement::Statement;
use crate::engine::error::EngineResult;
use crate::engine::traits::SqlConnection;
use crate::engine::types::QueryOutcome;

/// Fan-out tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Upper bound on simultaneous statements. `None` issues everything at once.
    pub max_concurrency: Option<usize>,
}

/// Results of one (table, column signature) group, in statement order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub table: String,
    pub signature: String,
    pub origins: Vec<usize>,
    pub outcomes: Vec<QueryOutcome>,
}

impl GroupOutcome {
    pub fn total_rows_affected(&self) -> u64 {
        self.outcomes.iter().map(QueryOutcome::total_rows_affected).sum()
    }
}

/// Binds a statement's parameters on a fresh request and runs it.
pub async fn execute_statement(
    connection: &dyn SqlConnection,
    statement: Statement,
) -> EngineResult<QueryOutcome> {
    let mut request = connection.request()?;
    let parameters = statement.params.len();
    for (name, value) in statement.params {
        request.input(&name, value);
    }
    debug!(adapter = connection.adapter_id(), parameters, "Executing statement");
    request.query(&statement.sql).await
}

/// Builds the statements of every group with `build`, runs them all
/// concurrently and regroups the outcomes.
pub async fn execute_query_queue<F>(
    connection: &dyn SqlConnection,
    groups: &TableGroups,
    options: QueueOptions,
    build: F,
) -> EngineResult<Vec<GroupOutcome>>
where
    F: Fn(&RowGroup) -> EngineResult<Vec<Statement>>,
{
    let mut plan: Vec<(&RowGroup, usize)> = Vec::with_capacity(groups.group_count());
    let mut statements = Vec::new();
    for group in groups.groups() {
        let built = build(group)?;
        plan.push((group, built.len()));
        statements.extend(built);
    }

    debug!(
        groups = plan.len(),
        statements = statements.len(),
        max_concurrency = ?options.max_concurrency,
        "Dispatching query queue"
    );

    let pending = statements
        .into_iter()
        .map(|statement| execute_statement(connection, statement));

    let outcomes = match options.max_concurrency {
        Some(limit) => {
            stream::iter(pending)
                .buffered(limit.max(1))
                .try_collect::<Vec<_>>()
                .await?
        }
        None => try_join_all(pending).await?,
    };

    let mut outcomes = outcomes.into_iter();
    Ok(plan
        .into_iter()
        .map(|(group, count)| GroupOutcome {
            table: group.table.clone(),
            signature: group.signature.key().to_string(),
            origins: group.origins(),
            outcomes: outcomes.by_ref().take(count).collect(),
        })
        .collect())
}
