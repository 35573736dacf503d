// SPDX-License-Identifier: Apache-2.0

// SQL Engine Module
// Batching core, connection adapters and operations

pub mod batch;
pub mod credentials;
pub mod drivers;
pub mod error;
pub mod operations;
pub mod sql_safety;
pub mod traits;
pub mod types;

pub use credentials::{AuthKind, Credentials};
pub use drivers::configure_connection;
pub use error::{EngineError, EngineResult};
pub use traits::{SqlConnection, SqlRequest};
pub use types::*;
