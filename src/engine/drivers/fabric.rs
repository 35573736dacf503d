// SPDX-License-Identifier: Apache-2.0

//! Fabric SQL token adapter
//!
//! Authenticates a service principal against Azure AD (client-credentials
//! grant) and opens a fresh TDS session per request, authenticated with the
//! access token. No pool is kept: each request connects, runs its statement,
//! buffers every row, and closes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info, warn};

use super::sqlserver::{run_request, MssqlClient};
use crate::engine::credentials::ServicePrincipalCredentials;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{SqlConnection, SqlRequest};
use crate::engine::types::{QueryOutcome, Value};
use crate::observability::Sensitive;

pub const DATABASE_SCOPE: &str = "https://database.windows.net/.default";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const FABRIC_PORT: u16 = 1433;
const FABRIC_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

// ==================== Token Sources ====================

/// Supplies Azure AD access tokens for a scope
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn get_token(&self, scope: &str) -> EngineResult<Sensitive<String>>;
}

/// OAuth2 client-credentials grant against the Microsoft identity platform
pub struct ClientSecretCredential {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: Sensitive<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ClientSecretCredential {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: Sensitive<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret,
        }
    }

    /// Overrides the identity endpoint (sovereign clouds, local stubs)
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[async_trait]
impl AccessTokenSource for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> EngineResult<Sensitive<String>> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose().as_str()),
            ("scope", scope),
        ];

        let response = self
            .http
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| EngineError::auth_failed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::auth_failed(e.to_string()))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => format!("token endpoint returned {}", status),
            };
            return Err(EngineError::auth_failed(message));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| EngineError::auth_failed(format!("Malformed token response: {e}")))?;
        Ok(Sensitive::new(token.access_token))
    }
}

// ==================== Token Adapter ====================

/// Connection to a Fabric SQL endpoint using an Azure AD access token
pub struct FabricConnection {
    server: String,
    database: String,
    token_source: Box<dyn AccessTokenSource>,
    access_token: Option<Sensitive<String>>,
}

impl FabricConnection {
    pub fn new(credentials: ServicePrincipalCredentials) -> Self {
        let source = ClientSecretCredential::new(
            &credentials.tenant_id,
            &credentials.client_id,
            credentials.client_secret,
        );
        Self::with_token_source(credentials.server, credentials.database, Box::new(source))
    }

    pub fn with_token_source(
        server: String,
        database: String,
        token_source: Box<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            server,
            database,
            token_source,
            access_token: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.access_token.is_some()
    }
}

#[async_trait]
impl SqlConnection for FabricConnection {
    fn adapter_id(&self) -> &'static str {
        "fabric-token"
    }

    async fn connect(&mut self) -> EngineResult<()> {
        let token = self
            .token_source
            .get_token(DATABASE_SCOPE)
            .await
            .map_err(|e| {
                EngineError::auth_failed(format!("Error generating Fabric Token: {}", e))
            })?;
        info!(server = %self.server, database = %self.database, "Fabric access token acquired");
        self.access_token = Some(token);
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.access_token = None;
        Ok(())
    }

    fn request(&self) -> EngineResult<Box<dyn SqlRequest>> {
        let token = self.access_token.clone().ok_or_else(|| {
            EngineError::not_connected("Connection not started. Call connect() first.")
        })?;
        Ok(Box::new(FabricRequest {
            server: self.server.clone(),
            database: self.database.clone(),
            token,
            params: Vec::new(),
        }))
    }
}

struct FabricRequest {
    server: String,
    database: String,
    token: Sensitive<String>,
    params: Vec<(String, Value)>,
}

impl FabricRequest {
    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.server);
        config.port(FABRIC_PORT);
        config.database(&self.database);
        config.authentication(AuthMethod::aad_token(self.token.expose()));
        config.encryption(EncryptionLevel::Required);
        config.trust_cert();
        config
    }

    async fn open(&self) -> EngineResult<MssqlClient> {
        let config = self.build_config();
        let connecting = async move {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| EngineError::connection_failed(e.to_string()))?;
            tcp.set_nodelay(true)
                .map_err(|e| EngineError::connection_failed(e.to_string()))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| EngineError::connection_failed(e.to_string()))
        };

        tokio::time::timeout(FABRIC_CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| EngineError::timeout(FABRIC_CONNECT_TIMEOUT.as_millis() as u64))?
    }
}

#[async_trait]
impl SqlRequest for FabricRequest {
    fn input(&mut self, name: &str, value: Value) {
        self.params.push((name.to_string(), value));
    }

    async fn query(&mut self, sql: &str) -> EngineResult<QueryOutcome> {
        let mut client = self.open().await?;
        debug!(server = %self.server, "Fabric session opened");

        let outcome = run_request(&mut client, sql, &self.params).await;

        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close Fabric session");
        }
        outcome
    }
}

// ==================== Tests ====================
