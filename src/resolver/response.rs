//! Response envelopes and key formatting.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::errors::ResolveError;
use crate::executor::ExecStats;
use crate::request::keys::{
    is_array_key, is_table_key, parse_entry, ARRAY_SUFFIX, KEY_CODE, KEY_MSG, KEY_OK, KEY_WARN,
};
use crate::request::JsonMap;

pub const CODE_SUCCESS: u16 = 200;
pub const MSG_SUCCESS: &str = "success";

/// Adds `ok`, `code`, `msg` (and `warn`) to a resolved body.
pub fn success(mut body: JsonMap, warn: Option<String>) -> JsonMap {
    body.insert(KEY_OK.to_string(), Value::Bool(true));
    body.insert(KEY_CODE.to_string(), Value::from(CODE_SUCCESS));
    body.insert(KEY_MSG.to_string(), Value::from(MSG_SUCCESS));
    if let Some(warn) = warn {
        body.insert(KEY_WARN.to_string(), Value::from(warn));
    }
    body
}

pub fn error(err: &ResolveError) -> JsonMap {
    let mut body = JsonMap::new();
    body.insert(KEY_OK.to_string(), Value::Bool(false));
    body.insert(KEY_CODE.to_string(), Value::from(err.code()));
    body.insert(KEY_MSG.to_string(), Value::from(err.to_string()));
    body
}

/// Timing and counters of one resolution, shown in debug mode.
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub parse_ms: i64,
    pub stats: ExecStats,
    pub max_sql_count: usize,
    pub depth: usize,
    pub max_depth: usize,
}

impl DebugInfo {
    pub fn apply(&self, body: &mut JsonMap) {
        let duration = (self.end - self.start).num_milliseconds();
        let sql_ms = self.stats.duration.as_millis() as i64;
        body.insert(
            "time:start|duration|end|parse|sql".to_string(),
            Value::from(format!(
                "{}|{}|{}|{}|{}",
                self.start.timestamp_millis(),
                duration,
                self.end.timestamp_millis(),
                self.parse_ms,
                sql_ms
            )),
        );
        body.insert(
            "sql:generate|cache|execute|maxExecute".to_string(),
            Value::from(format!(
                "{}|{}|{}|{}",
                self.stats.generated, self.stats.cached, self.stats.executed, self.max_sql_count
            )),
        );
        body.insert(
            "depth:count|max".to_string(),
            Value::from(format!("{}|{}", self.depth, self.max_depth)),
        );
    }
}

/// Rewrites table and array keys into variable names, recursively:
/// `User` → `user`, `User:owner` → `owner`, `Comment[]` → `commentList`,
/// `User-id[]` → `userIdList`.
pub fn format_keys(body: JsonMap) -> JsonMap {
    body.into_iter()
        .map(|(key, value)| (format_key(&key), format_value(value)))
        .collect()
}

fn format_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(format_keys(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(format_value).collect()),
        other => other,
    }
}

fn format_key(key: &str) -> String {
    if is_array_key(key) {
        let base = &key[..key.len() - ARRAY_SUFFIX.len()];
        if base.is_empty() {
            return key.to_string();
        }
        let (name, alias) = parse_entry(base);
        return match alias {
            Some(alias) => format!("{}List", alias),
            None => format!("{}List", variable_name(name)),
        };
    }
    let (name, alias) = parse_entry(key);
    if !is_table_key(name) {
        return key.to_string();
    }
    match alias {
        Some(alias) => alias.to_string(),
        None => variable_name(name),
    }
}

/// `User-id` → `userId`.
fn variable_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('-').filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}
