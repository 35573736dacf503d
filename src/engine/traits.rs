// SPDX-License-Identifier: Apache-2.0

//! Connection adapter contract
//!
//! The batching core never talks to a wire client directly. It obtains a
//! [`SqlRequest`] from a [`SqlConnection`], binds named parameters on it and
//! runs one SQL text. Both the pooled password adapter and the Azure AD token
//! adapter implement this pair of traits, and tests substitute a recorder.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{QueryOutcome, Value};

/// A live (or lazily opened) connection to SQL Server
///
/// `request()` takes `&self` so that many requests can be in flight at once
/// during a fan-out; implementations must tolerate concurrent use.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Short identifier of the adapter (e.g. "pool", "fabric-token")
    fn adapter_id(&self) -> &'static str;

    /// Establishes the connection or acquires whatever credential it needs
    async fn connect(&mut self) -> EngineResult<()>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&mut self) -> EngineResult<()>;

    /// Starts a new request bound to this connection
    fn request(&self) -> EngineResult<Box<dyn SqlRequest>>;
}

/// A single parameterized round trip
#[async_trait]
pub trait SqlRequest: Send {
    /// Binds `value` to `@name` in the SQL text passed to [`SqlRequest::query`]
    fn input(&mut self, name: &str, value: Value);

    /// Executes `sql` with every bound input
    async fn query(&mut self, sql: &str) -> EngineResult<QueryOutcome>;
}
