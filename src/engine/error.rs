// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the connector engine
//!
//! Wire-client, pool and identity-service failures are all mapped onto
//! [`EngineError`]. Database messages are carried through unmodified so the
//! host sees exactly what SQL Server reported.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all connector operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("{message}")]
    ConnectionFailed { message: String },

    #[error("{message}")]
    AuthenticationFailed { message: String },

    #[error("{message}")]
    ExecutionError { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{message}")]
    NotConnected { message: String },

    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected { message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Short machine-readable category, used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection",
            Self::AuthenticationFailed { .. } => "authentication",
            Self::ExecutionError { .. } => "execution",
            Self::Timeout { .. } => "timeout",
            Self::NotConnected { .. } => "not_connected",
            Self::ConfigError { .. } => "config",
            Self::ValidationError { .. } => "validation",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<tiberius::error::Error> for EngineError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => Self::execution_error(token.message()),
            other => Self::execution_error(other.to_string()),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
