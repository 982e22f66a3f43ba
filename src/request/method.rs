//! Request methods and array query modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::keys;

/// Method a request (or a single branch of it) is resolved under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Head,
    Gets,
    Heads,
    Post,
    Put,
    Delete,
    /// Meta method: each top-level key selects its own method.
    Crud,
}

impl RequestMethod {
    pub const ALL: [RequestMethod; 8] = [
        RequestMethod::Get,
        RequestMethod::Head,
        RequestMethod::Gets,
        RequestMethod::Heads,
        RequestMethod::Post,
        RequestMethod::Put,
        RequestMethod::Delete,
        RequestMethod::Crud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Head => "HEAD",
            RequestMethod::Gets => "GETS",
            RequestMethod::Heads => "HEADS",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Crud => "CRUD",
        }
    }

    /// GET, or GET/GETS when `include_gets` is set.
    pub fn is_get(&self, include_gets: bool) -> bool {
        matches!(self, RequestMethod::Get) || (include_gets && matches!(self, RequestMethod::Gets))
    }

    /// HEAD, or HEAD/HEADS when `include_heads` is set.
    pub fn is_head(&self, include_heads: bool) -> bool {
        matches!(self, RequestMethod::Head)
            || (include_heads && matches!(self, RequestMethod::Heads))
    }

    /// Read-only methods. These never open a transaction.
    pub fn is_query(&self) -> bool {
        self.is_get(true) || self.is_head(true)
    }

    /// Methods that need no content verification.
    pub fn is_public(&self) -> bool {
        matches!(self, RequestMethod::Get | RequestMethod::Head)
    }

    pub fn is_mutation(&self) -> bool {
        !self.is_query()
    }

    /// Fixed mapping of the per-key meta selectors (`@get`, `@post`, ...).
    pub fn from_meta_key(key: &str) -> Option<Self> {
        match key {
            keys::KEY_GET => Some(RequestMethod::Get),
            keys::KEY_GETS => Some(RequestMethod::Gets),
            keys::KEY_HEAD => Some(RequestMethod::Head),
            keys::KEY_HEADS => Some(RequestMethod::Heads),
            keys::KEY_POST => Some(RequestMethod::Post),
            keys::KEY_PUT => Some(RequestMethod::Put),
            keys::KEY_DELETE => Some(RequestMethod::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown request method `{}`", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for RequestMethod {
    type Err = UnknownMethod;

    /// Exact, upper-case match only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// What an array resolution fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryMode {
    /// Rows only.
    #[default]
    Table,
    /// Count only.
    Total,
    /// Rows plus count and pagination metadata.
    All,
}

impl QueryMode {
    /// Accepts `0/1/2` or `TABLE/TOTAL/ALL`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" | "TABLE" => Some(QueryMode::Table),
            "1" | "TOTAL" => Some(QueryMode::Total),
            "2" | "ALL" => Some(QueryMode::All),
            _ => None,
        }
    }
}
