// SPDX-License-Identifier: Apache-2.0

//! Job files for the headless runner
//!
//! ```json
//! {
//!   "credentials": { "server": "db.local", "user": "sa", "password": "..." },
//!   "operation": "insert",
//!   "parameters": { "table": "users", "columns": "id,name" },
//!   "items": [{ "id": 1, "name": "Ann" }],
//!   "options": { "continueOnFail": false }
//! }
//! ```
//!
//! `parameters` is either one object applied to every item or an array with
//! one object per item.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{NodeOptions, NodeParameters, Operation};
use crate::engine::credentials::Credentials;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{InputItem, JsonObject};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSource {
    PerItem(Vec<NodeParameters>),
    Shared(NodeParameters),
}

impl Default for ParameterSource {
    fn default() -> Self {
        ParameterSource::Shared(NodeParameters::default())
    }
}

impl ParameterSource {
    /// One parameter set per item.
    pub fn expand(&self, item_count: usize) -> EngineResult<Vec<NodeParameters>> {
        match self {
            ParameterSource::Shared(params) => Ok(vec![params.clone(); item_count]),
            ParameterSource::PerItem(list) if list.len() == item_count => Ok(list.clone()),
            ParameterSource::PerItem(list) => Err(EngineError::config(format!(
                "parameters lists {} entries for {} items",
                list.len(),
                item_count
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub credentials: serde_json::Value,
    pub operation: Operation,
    #[serde(default)]
    pub parameters: ParameterSource,
    #[serde(default)]
    pub items: Vec<JsonObject>,
    #[serde(default)]
    pub options: NodeOptions,
}

impl Job {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read job file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> EngineResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| EngineError::config(format!("invalid job file: {e}")))
    }

    pub fn credentials(&self) -> EngineResult<Credentials> {
        Credentials::from_json(&self.credentials)
    }

    pub fn input_items(&self) -> Vec<InputItem> {
        InputItem::from_records(self.items.clone())
    }

    pub fn item_parameters(&self) -> EngineResult<Vec<NodeParameters>> {
        self.parameters.expand(self.items.len())
    }
}
