// SPDX-License-Identifier: Apache-2.0

//! Recording connection shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fabricsql_node::engine::error::{EngineError, EngineResult};
use fabricsql_node::engine::traits::{SqlConnection, SqlRequest};
use fabricsql_node::engine::types::{JsonObject, QueryOutcome, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

#[derive(Default)]
struct State {
    executed: Vec<Executed>,
    connects: usize,
    closes: usize,
}

/// Records every statement instead of talking to a server.
///
/// DELETE statements report one affected row per bound key, other writes one
/// row per statement, and queries return `rows` when it is set.
#[derive(Clone, Default)]
pub struct RecordingConnection {
    state: Arc<Mutex<State>>,
    connected: bool,
    fail_connect: Option<String>,
    fail_on: Option<(String, String)>,
    rows: Option<Vec<Vec<JsonObject>>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect(message: &str) -> Self {
        Self {
            fail_connect: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Statements whose SQL contains `needle` fail with `message`.
    pub fn failing_on(mut self, needle: &str, message: &str) -> Self {
        self.fail_on = Some((needle.to_string(), message.to_string()));
        self
    }

    pub fn with_rows(mut self, recordsets: Vec<Vec<JsonObject>>) -> Self {
        self.rows = Some(recordsets);
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl SqlConnection for RecordingConnection {
    fn adapter_id(&self) -> &'static str {
        "recording"
    }

    async fn connect(&mut self) -> EngineResult<()> {
        self.state.lock().unwrap().connects += 1;
        if let Some(message) = &self.fail_connect {
            return Err(EngineError::connection_failed(message.clone()));
        }
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.state.lock().unwrap().closes += 1;
        self.connected = false;
        Ok(())
    }

    fn request(&self) -> EngineResult<Box<dyn SqlRequest>> {
        if !self.connected {
            return Err(EngineError::not_connected(
                "Connection not started. Call connect() first.",
            ));
        }
        Ok(Box::new(RecordingRequest {
            connection: self.clone(),
            params: Vec::new(),
        }))
    }
}

struct RecordingRequest {
    connection: RecordingConnection,
    params: Vec<(String, Value)>,
}

#[async_trait]
impl SqlRequest for RecordingRequest {
    fn input(&mut self, name: &str, value: Value) {
        self.params.push((name.to_string(), value));
    }

    async fn query(&mut self, sql: &str) -> EngineResult<QueryOutcome> {
        tokio::task::yield_now().await;

        self.connection.state.lock().unwrap().executed.push(Executed {
            sql: sql.to_string(),
            params: self.params.clone(),
        });

        if let Some((needle, message)) = &self.connection.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(EngineError::execution_error(message.clone()));
            }
        }

        if sql.starts_with("DELETE") {
            return Ok(QueryOutcome::with_rows_affected(vec![self.params.len() as u64]));
        }
        if sql.starts_with("INSERT") || sql.starts_with("UPDATE") {
            return Ok(QueryOutcome::with_rows_affected(vec![1]));
        }
        Ok(match &self.connection.rows {
            Some(sets) => QueryOutcome::from_recordsets(sets.clone()),
            None => QueryOutcome::default(),
        })
    }
}

pub fn object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}
