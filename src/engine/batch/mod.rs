// SPDX-License-Identifier: Apache-2.0

//! Batching core: grouping, chunking, statement building and fan-out.

pub mod chunk;
pub mod group;
pub mod queue;
pub mod statement;

pub use chunk::{chunk, chunk_by_parameters, DELETE_WINDOW, PARAMETER_LIMIT};
pub use group::{ColumnSignature, GroupedRow, RowDescriptor, RowGroup, RowPayload, TableGroups};
pub use queue::{execute_query_queue, execute_statement, GroupOutcome, QueueOptions};
pub use statement::{escape_table_name, format_columns, Statement};
