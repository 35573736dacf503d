// SPDX-License-Identifier: Apache-2.0

//! Credential shapes accepted from the host
//!
//! Two credential forms exist: a SQL login (optionally a Windows domain
//! account) and an Entra ID service principal. The authentication kind is
//! resolved once, here, and decides which connection adapter is built.

use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};
use crate::observability::Sensitive;

/// Which adapter a set of credentials selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthKind {
    SqlLogin,
    ServicePrincipal,
}

/// TDS protocol versions offered by the credential form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TdsVersion {
    #[default]
    #[serde(rename = "7_4")]
    V7_4,
    #[serde(rename = "7_3_B")]
    V7_3B,
    #[serde(rename = "7_3_A")]
    V7_3A,
    #[serde(rename = "7_2")]
    V7_2,
    #[serde(rename = "7_1")]
    V7_1,
}

impl TdsVersion {
    /// Whether the wire client can speak this version. tiberius negotiates
    /// TDS 7.3 or 7.4 only.
    pub fn is_supported(self) -> bool {
        matches!(self, TdsVersion::V7_4 | TdsVersion::V7_3A | TdsVersion::V7_3B)
    }
}

fn default_server() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "master".to_string()
}

fn default_user() -> String {
    "sa".to_string()
}

fn default_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    15_000
}

/// Password (or Windows domain) credentials for the pooled adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlLoginCredentials {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Sensitive<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_true", alias = "tls")]
    pub encrypt: bool,
    #[serde(default)]
    pub allow_unauthorized_certs: bool,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout: u64,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout: u64,
    #[serde(default)]
    pub tds_version: TdsVersion,
}

impl SqlLoginCredentials {
    /// The domain, if one was actually entered.
    pub fn windows_domain(&self) -> Option<&str> {
        self.domain.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

/// Entra ID service principal credentials for the token adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalCredentials {
    pub server: String,
    pub database: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Sensitive<String>,
}

/// Credentials resolved to exactly one authentication kind
#[derive(Debug, Clone)]
pub enum Credentials {
    SqlLogin(SqlLoginCredentials),
    ServicePrincipal(ServicePrincipalCredentials),
}

impl Credentials {
    /// Resolves the host's credential object.
    ///
    /// An explicit `authType` wins. Without one, the presence of both
    /// `clientId` and `tenantId` selects the service principal form.
    pub fn from_json(value: &serde_json::Value) -> EngineResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| EngineError::config("credentials must be a JSON object"))?;

        let explicit = match object.get("authType") {
            Some(kind) => Some(serde_json::from_value::<AuthKind>(kind.clone()).map_err(|e| {
                EngineError::config(format!("unknown authType {}: {}", kind, e))
            })?),
            None => None,
        };

        let has_field = |name: &str| {
            object
                .get(name)
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false)
        };

        let kind = explicit.unwrap_or(if has_field("clientId") && has_field("tenantId") {
            AuthKind::ServicePrincipal
        } else {
            AuthKind::SqlLogin
        });

        match kind {
            AuthKind::SqlLogin => serde_json::from_value(value.clone())
                .map(Credentials::SqlLogin)
                .map_err(|e| EngineError::config(format!("invalid SQL login credentials: {e}"))),
            AuthKind::ServicePrincipal => serde_json::from_value(value.clone())
                .map(Credentials::ServicePrincipal)
                .map_err(|e| {
                    EngineError::config(format!("invalid service principal credentials: {e}"))
                }),
        }
    }

    pub fn auth_kind(&self) -> AuthKind {
        match self {
            Credentials::SqlLogin(_) => AuthKind::SqlLogin,
            Credentials::ServicePrincipal(_) => AuthKind::ServicePrincipal,
        }
    }

    pub fn server(&self) -> &str {
        match self {
            Credentials::SqlLogin(c) => &c.server,
            Credentials::ServicePrincipal(c) => &c.server,
        }
    }
}
