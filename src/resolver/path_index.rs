//! Path-keyed index of resolved values, shared by every branch of one
//! request.
//!
//! Every resolved node is recorded under its `/`-joined path before later
//! siblings run, so a reference such as `"userId@": "/User/id"` reads the
//! row an earlier branch produced. Lookups that miss the index fall back to
//! the request tree itself.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::request::keys::split_path;
use crate::request::{map_value_at, value_at, JsonMap};

/// Outcome of a reference lookup. `Null` and `Missing` are kept apart so
/// strict resolution can reject a reference that exists but holds null.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    Null,
    Missing,
}

impl Lookup {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Null) => Lookup::Null,
            Some(v) => Lookup::Found(v.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Null | Lookup::Missing => None,
        }
    }
}

/// Read access to resolved values, used by the join parser.
pub trait ReferenceLookup {
    fn lookup_reference(&self, path: &str) -> Lookup;
}

/// How a null reference value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Skip the referencing node and record a warning.
    #[default]
    Permissive,
    /// Fail the request when a reference was found but is null.
    Strict,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown reference policy `{0}`, expected permissive or strict")]
pub struct UnknownPolicy(pub String);

impl FromStr for ReferencePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(ReferencePolicy::Permissive),
            "strict" => Ok(ReferencePolicy::Strict),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferencePolicy::Permissive => f.write_str("permissive"),
            ReferencePolicy::Strict => f.write_str("strict"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PathIndex {
    entries: HashMap<String, Value>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<String>, value: Value) {
        let path = path.into();
        log::debug!("record {}", path);
        self.entries.insert(path, value);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact entry, else the longest recorded prefix descended by the
    /// remaining segments, else the request tree at the same path.
    pub fn lookup(&self, path: &str, request: &JsonMap) -> Lookup {
        if path.is_empty() {
            return Lookup::Missing;
        }
        if let Some(value) = self.entries.get(path) {
            return Lookup::from_value(Some(value));
        }

        let prefix = self
            .entries
            .keys()
            .filter(|k| path.len() > k.len() + 1 && path.starts_with(k.as_str()))
            .filter(|k| path.as_bytes()[k.len()] == b'/')
            .max_by_key(|k| k.len());
        if let Some(prefix) = prefix {
            let rest = split_path(&path[prefix.len()..]);
            if let Some(value) = self.entries.get(prefix).and_then(|v| value_at(v, &rest)) {
                return Lookup::from_value(Some(value));
            }
        }

        Lookup::from_value(map_value_at(request, &split_path(path)))
    }

    pub fn resolve(&self, path: &str, request: &JsonMap) -> Option<Value> {
        self.lookup(path, request).into_value()
    }
}

/// Joins `parent` and `name` with `/`, dropping a leading `/`.
pub fn abs_path(parent: &str, name: &str) -> String {
    let path = if parent.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        parent.to_string()
    } else if name.starts_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    };
    match path.strip_prefix('/') {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

/// Absolute path of a reference written inside the node at `parent`.
/// `/Sibling/key` is relative to `parent`; anything else is absolute from the
/// root, with array row indexes shared with `parent` filled in.
pub fn value_path(parent: &str, reference: &str) -> String {
    if reference.starts_with('/') {
        abs_path(parent, reference)
    } else {
        rewrite_array_path(parent, reference)
    }
}

/// `[]/User/id` referenced from `[]/3` becomes `[]/3/User/id`: every array
/// level the reference shares with `parent` receives the parent's current
/// row index.
pub fn rewrite_array_path(parent: &str, reference: &str) -> String {
    let parents: Vec<&str> = parent.split("]/").collect();
    if parents.len() <= 1 {
        return reference.to_string();
    }
    let mut parts: Vec<String> = reference.split("]/").map(str::to_string).collect();
    for i in 0..parents.len() - 1 {
        if i + 1 >= parts.len() || parents[i] != parts[i] {
            break;
        }
        let position = parents[i + 1].split('/').next().unwrap_or_default();
        if !parts[i + 1].starts_with(&format!("{}/", position)) {
            parts[i + 1] = format!("{}/{}", position, parts[i + 1]);
        }
    }
    parts.join("]/")
}
