// SPDX-License-Identifier: Apache-2.0

// Connection adapters

pub mod fabric;
pub mod sqlserver;

use tracing::debug;

use crate::engine::credentials::Credentials;
use crate::engine::traits::SqlConnection;

pub use fabric::{AccessTokenSource, ClientSecretCredential, FabricConnection};
pub use sqlserver::SqlServerPool;

/// Default upper bound on pooled connections
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Picks the adapter matching the credential form. Nothing is opened until
/// `connect()` is called on the result.
pub fn configure_connection(
    credentials: Credentials,
    max_connections: u32,
) -> Box<dyn SqlConnection> {
    let connection: Box<dyn SqlConnection> = match credentials {
        Credentials::SqlLogin(login) => Box::new(SqlServerPool::new(login, max_connections)),
        Credentials::ServicePrincipal(principal) => Box::new(FabricConnection::new(principal)),
    };
    debug!(adapter = connection.adapter_id(), "Connection configured");
    connection
}
