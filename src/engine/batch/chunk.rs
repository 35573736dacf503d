// SPDX-License-Identifier: Apache-2.0

//! Request chunking
//!
//! SQL Server rejects a statement carrying 2100 or more parameters, so bulk
//! inserts are split into contiguous batches whose summed field count stays
//! under that budget.

/// Maximum number of bound values SQL Server accepts in one request.
pub const PARAMETER_LIMIT: usize = 2100;

/// Number of keys per `DELETE ... IN (...)` statement.
pub const DELETE_WINDOW: usize = 1000;

/// Anything that contributes bound parameters to a statement
pub trait ParameterCount {
    fn parameter_count(&self) -> usize;
}

/// Greedily splits `rows` into contiguous batches whose parameter total stays
/// below `limit`.
///
/// A batch is closed before a row that would bring the running count to
/// `limit` or beyond. Rows are never split: a row that alone reaches the limit
/// ends up in a batch of its own and is left for the server to reject.
/// No batch is ever empty.
pub fn chunk_by_parameters<T: ParameterCount>(rows: &[T], limit: usize) -> Vec<&[T]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut running = 0;

    for (index, row) in rows.iter().enumerate() {
        let count = row.parameter_count();
        if index > start && running + count >= limit {
            batches.push(&rows[start..index]);
            start = index;
            running = 0;
        }
        running += count;
    }

    if start < rows.len() {
        batches.push(&rows[start..]);
    }
    batches
}

/// Fixed-size windows over `items`; the last window may be shorter.
pub fn chunk<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}
