// SPDX-License-Identifier: Apache-2.0

// fabricsql-node - SQL Server / Fabric SQL connector node
// Core library

pub mod engine;
pub mod node;
pub mod observability;

pub use engine::{configure_connection, Credentials, EngineError, EngineResult};
pub use node::{execute, test_connection, NodeOptions, NodeParameters, Operation};
