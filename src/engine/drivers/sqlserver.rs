// SPDX-License-Identifier: Apache-2.0

//! SQL Server pooled adapter
//!
//! Implements [`SqlConnection`] for password (or Windows domain) logins using
//! Tiberius, with bb8 for async connection pooling. Also hosts the Tiberius
//! helpers shared with the Fabric token adapter: named-parameter rewriting,
//! value binding and row conversion.
//!
//! ## SQL Server Specifics
//!
//! - TDS protocol, default port 1433
//! - Tiberius binds parameters positionally as `@P1..@Pn`; statements built
//!   by this crate use names (`@r0v1`, `@condition`) which are rewritten
//!   just before execution
//! - A single request may carry at most 2100 parameters

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bb8::{Pool, RunError};
use bb8_tiberius::ConnectionManager;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::{debug, info, warn};

use crate::engine::credentials::SqlLoginCredentials;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_safety;
use crate::engine::traits::{SqlConnection, SqlRequest};
use crate::engine::types::{JsonObject, QueryOutcome, Value};

// ==================== Types ====================

type MssqlPool = Pool<ConnectionManager>;
pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

const APPLICATION_NAME: &str = "fabricsql-node";

// ==================== Pool Adapter ====================

/// Pooled connection for SQL logins
pub struct SqlServerPool {
    credentials: SqlLoginCredentials,
    max_connections: u32,
    pool: Option<MssqlPool>,
}

impl SqlServerPool {
    pub fn new(credentials: SqlLoginCredentials, max_connections: u32) -> Self {
        Self {
            credentials,
            max_connections: max_connections.max(1),
            pool: None,
        }
    }

    /// Build a tiberius Config from the credential form.
    fn build_config(credentials: &SqlLoginCredentials) -> EngineResult<Config> {
        let mut config = Config::new();
        config.host(&credentials.server);
        config.port(credentials.port);
        if !credentials.database.is_empty() {
            config.database(&credentials.database);
        }
        config.application_name(APPLICATION_NAME);
        config.authentication(Self::auth_method(credentials)?);
        config.encryption(if credentials.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        if credentials.allow_unauthorized_certs {
            config.trust_cert();
        }
        Ok(config)
    }

    #[cfg(windows)]
    fn auth_method(credentials: &SqlLoginCredentials) -> EngineResult<AuthMethod> {
        Ok(match credentials.windows_domain() {
            Some(domain) => AuthMethod::windows(
                format!("{}\\{}", domain, credentials.user),
                credentials.password.expose(),
            ),
            None => AuthMethod::sql_server(&credentials.user, credentials.password.expose()),
        })
    }

    #[cfg(not(windows))]
    fn auth_method(credentials: &SqlLoginCredentials) -> EngineResult<AuthMethod> {
        match credentials.windows_domain() {
            Some(domain) => Err(EngineError::config(format!(
                "Windows domain login ({}) is only supported on Windows hosts",
                domain
            ))),
            None => Ok(AuthMethod::sql_server(
                &credentials.user,
                credentials.password.expose(),
            )),
        }
    }
}

#[async_trait]
impl SqlConnection for SqlServerPool {
    fn adapter_id(&self) -> &'static str {
        "pool"
    }

    async fn connect(&mut self) -> EngineResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let credentials = &self.credentials;
        if !credentials.tds_version.is_supported() {
            warn!(
                tds_version = ?credentials.tds_version,
                "Requested TDS version predates 7.3; the server will be asked for 7.3 or later"
            );
        }

        let config = Self::build_config(credentials)?;
        let manager = ConnectionManager::new(config);

        let pool = Pool::builder()
            .max_size(self.max_connections)
            .connection_timeout(Duration::from_millis(credentials.connect_timeout))
            .retry_connection(false)
            .build(manager)
            .await
            .map_err(pool_error)?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| run_error(e, credentials.connect_timeout))?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| pool_error(e.into()))?
                .into_results()
                .await
                .map_err(|e| pool_error(e.into()))?;
        }

        info!(
            server = %credentials.server,
            port = credentials.port,
            database = %credentials.database,
            max_connections = self.max_connections,
            "Connected to SQL Server"
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        if self.pool.take().is_some() {
            info!(server = %self.credentials.server, "Connection pool closed");
        }
        Ok(())
    }

    fn request(&self) -> EngineResult<Box<dyn SqlRequest>> {
        let pool = self.pool.clone().ok_or_else(|| {
            EngineError::not_connected("Connection not started. Call connect() first.")
        })?;
        Ok(Box::new(PooledRequest {
            pool,
            params: Vec::new(),
            connect_timeout_ms: self.credentials.connect_timeout,
            request_timeout_ms: self.credentials.request_timeout,
        }))
    }
}

struct PooledRequest {
    pool: MssqlPool,
    params: Vec<(String, Value)>,
    connect_timeout_ms: u64,
    request_timeout_ms: u64,
}

#[async_trait]
impl SqlRequest for PooledRequest {
    fn input(&mut self, name: &str, value: Value) {
        self.params.push((name.to_string(), value));
    }

    async fn query(&mut self, sql: &str) -> EngineResult<QueryOutcome> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| run_error(e, self.connect_timeout_ms))?;

        let timeout = Duration::from_millis(self.request_timeout_ms);
        tokio::time::timeout(timeout, run_request(&mut conn, sql, &self.params))
            .await
            .map_err(|_| EngineError::timeout(self.request_timeout_ms))?
    }
}

/// Connection-level failure carrying the server's message as-is.
fn pool_error(err: bb8_tiberius::Error) -> EngineError {
    match err {
        bb8_tiberius::Error::Tiberius(e) => {
            EngineError::connection_failed(EngineError::from(e).to_string())
        }
        bb8_tiberius::Error::Io(e) => EngineError::connection_failed(e.to_string()),
    }
}

fn run_error(err: RunError<bb8_tiberius::Error>, timeout_ms: u64) -> EngineError {
    match err {
        RunError::User(e) => pool_error(e),
        RunError::TimedOut => EngineError::timeout(timeout_ms),
    }
}

// ==================== Request Execution ====================

/// Executes `sql` with named parameters on an open client.
///
/// Row-returning statements are read through a query stream; everything else
/// is executed so the per-statement affected counts are available.
pub(crate) async fn run_request(
    client: &mut MssqlClient,
    sql: &str,
    params: &[(String, Value)],
) -> EngineResult<QueryOutcome> {
    let (sql, ordered) = rewrite_named_parameters(sql, params);
    let wants_rows =
        sql_safety::returns_rows(&sql).unwrap_or_else(|_| sql_safety::scan_returns_rows(&sql));

    let mut query = Query::new(sql);
    for value in ordered {
        bind_value(&mut query, value);
    }

    if wants_rows {
        let stream = query.query(client).await?;
        let sets = stream.into_results().await?;
        let recordsets = sets
            .iter()
            .map(|set| set.iter().map(convert_row).collect())
            .collect();
        Ok(QueryOutcome::from_recordsets(recordsets))
    } else {
        let result = query.execute(client).await?;
        debug!(rows_affected = ?result.rows_affected(), "Statement executed");
        Ok(QueryOutcome::with_rows_affected(result.rows_affected().to_vec()))
    }
}

/// Rewrites `@name` references into Tiberius' positional `@Pn` form.
///
/// Parameters are numbered in binding order. Unknown names, `@@` system
/// variables and anything inside string literals, quoted or bracketed
/// identifiers are left alone. Returns the values in positional order.
pub(crate) fn rewrite_named_parameters<'a>(
    sql: &str,
    params: &'a [(String, Value)],
) -> (String, Vec<&'a Value>) {
    if params.is_empty() {
        return (sql.to_string(), Vec::new());
    }

    let positions: HashMap<&str, usize> = params
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i + 1))
        .collect();

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        match ch {
            '\'' | '"' | '[' => {
                let close = if ch == '[' { ']' } else { ch };
                out.push(ch);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == close {
                        break;
                    }
                }
            }
            '@' => match chars.peek() {
                Some(&(_, '@')) => {
                    out.push('@');
                    if let Some((_, next)) = chars.next() {
                        out.push(next);
                    }
                }
                Some(&(_, next)) if next.is_ascii_alphabetic() || next == '_' => {
                    let mut end = start + 1;
                    while let Some(&(i, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            end = i + c.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start + 1..end];
                    match positions.get(name) {
                        Some(position) => out.push_str(&format!("@P{}", position)),
                        None => out.push_str(&sql[start..end]),
                    }
                }
                _ => out.push('@'),
            },
            _ => out.push(ch),
        }
    }

    (out, params.iter().map(|(_, value)| value).collect())
}

fn bind_value<'a>(query: &mut Query<'a>, value: &Value) {
    match value {
        Value::Null => query.bind(Option::<&'a str>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Json(j) => query.bind(j.to_string()),
    }
}

// ==================== Type Conversion ====================

fn float_json(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Convert a tiberius ColumnData to a JSON value.
fn convert_column_data(data: &ColumnData<'_>) -> serde_json::Value {
    use serde_json::Value as J;
    match data {
        ColumnData::Bit(Some(b)) => J::Bool(*b),
        ColumnData::U8(Some(v)) => J::from(*v),
        ColumnData::I16(Some(v)) => J::from(*v),
        ColumnData::I32(Some(v)) => J::from(*v),
        ColumnData::I64(Some(v)) => J::from(*v),
        ColumnData::F32(Some(v)) => float_json(*v as f64),
        ColumnData::F64(Some(v)) => float_json(*v),
        ColumnData::Numeric(Some(n)) => {
            float_json(n.value() as f64 / 10f64.powi(n.scale() as i32))
        }
        ColumnData::String(Some(s)) => J::String(s.to_string()),
        ColumnData::Guid(Some(g)) => J::String(g.to_string()),
        ColumnData::Binary(Some(b)) => J::String(STANDARD.encode(b)),
        ColumnData::Xml(Some(xml)) => J::String(xml.to_string()),
        _ => J::Null,
    }
}

/// Convert a tiberius Row to a JSON object keyed by column name.
/// Date/time columns go through chrono via `row.try_get`.
fn convert_row(row: &tiberius::Row) -> JsonObject {
    use serde_json::Value as J;

    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut object = JsonObject::new();

    for (i, (_, data)) in row.cells().enumerate() {
        let value = match data {
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(|dt| J::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                .unwrap_or(J::Null),
            ColumnData::DateTimeOffset(Some(_)) => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                .ok()
                .flatten()
                .map(|dt| J::String(dt.to_rfc3339()))
                .unwrap_or(J::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|d| J::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(J::Null),
            ColumnData::Time(Some(_)) => row
                .try_get::<chrono::NaiveTime, _>(i)
                .ok()
                .flatten()
                .map(|t| J::String(t.format("%H:%M:%S%.f").to_string()))
                .unwrap_or(J::Null),
            _ => convert_column_data(data),
        };
        let name = names.get(i).cloned().unwrap_or_else(|| format!("column{}", i));
        object.insert(name, value);
    }
    object
}

// ==================== Tests ====================
