// SPDX-License-Identifier: Apache-2.0

//! `{{ ... }}` placeholders in raw SQL
//!
//! Placeholders are found with a non-greedy scan and handed to an
//! [`ExpressionResolver`]. Inside a workflow host the resolver is the host's
//! own expression engine; the headless runner uses [`JsonPathResolver`],
//! which only understands `$json` paths into the current item.

use std::sync::OnceLock;

use regex::Regex;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::InputItem;

fn resolvable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([\s\S]*?)\}\}").expect("static pattern"))
}

/// Every `{{...}}` occurrence in `text`, in order, delimiters included.
pub fn get_resolvables(text: &str) -> Vec<&str> {
    resolvable_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .collect()
}

/// Evaluates one placeholder (delimiters included) against an input item
pub trait ExpressionResolver: Send + Sync {
    fn resolve(&self, expression: &str, item: &InputItem) -> EngineResult<String>;
}

/// Replaces each placeholder in `query` with its resolved text.
///
/// Each resolvable replaces its first remaining occurrence, so repeated
/// placeholders are resolved one at a time.
pub fn resolve_query(
    query: &str,
    item: &InputItem,
    resolver: &dyn ExpressionResolver,
) -> EngineResult<String> {
    let mut resolved = query.to_string();
    for resolvable in get_resolvables(query) {
        let value = resolver.resolve(resolvable, item)?;
        resolved = resolved.replacen(resolvable, &value, 1);
    }
    Ok(resolved)
}

/// Resolves `{{ $json.a.b }}`, `{{ $json["a"] }}` and `{{ $json.list[0] }}`.
///
/// Strings render raw, `null` and missing paths render empty, and anything
/// else renders as JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathResolver;

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl JsonPathResolver {
    fn parse_path(path: &str) -> EngineResult<Vec<Segment>> {
        let invalid = || EngineError::validation(format!("Unsupported expression path: {path}"));
        let mut segments = Vec::new();
        let mut rest = path;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                if end == 0 {
                    return Err(invalid());
                }
                segments.push(Segment::Key(after[..end].to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(invalid)?;
                let inner = after[..end].trim();
                let quoted = inner
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
                match quoted {
                    Some(key) => segments.push(Segment::Key(key.to_string())),
                    None => segments.push(Segment::Index(inner.parse().map_err(|_| invalid())?)),
                }
                rest = &after[end + 1..];
            } else {
                return Err(invalid());
            }
        }
        Ok(segments)
    }
}

impl ExpressionResolver for JsonPathResolver {
    fn resolve(&self, expression: &str, item: &InputItem) -> EngineResult<String> {
        let body = expression
            .trim()
            .trim_start_matches("{{")
            .trim_end_matches("}}")
            .trim();
        let path = body.strip_prefix("$json").ok_or_else(|| {
            EngineError::validation(format!("Unsupported expression: {}", expression))
        })?;

        let mut current: Option<&serde_json::Value> = None;
        for (i, segment) in Self::parse_path(path)?.into_iter().enumerate() {
            current = match (i, current, segment) {
                (0, _, Segment::Key(key)) => item.json.get(&key),
                (0, _, Segment::Index(_)) => None,
                (_, Some(serde_json::Value::Object(map)), Segment::Key(key)) => map.get(&key),
                (_, Some(serde_json::Value::Array(list)), Segment::Index(idx)) => list.get(idx),
                _ => None,
            };
            if current.is_none() {
                break;
            }
        }

        Ok(match current {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
    }
}
