//! Reserved request keys and the naming conventions that classify keys.

use lazy_static::lazy_static;
use regex::Regex;

// Root-level request keys
pub const KEY_FORMAT: &str = "format";
pub const KEY_VERSION: &str = "version";
pub const KEY_TAG: &str = "tag";

// Selectors accepted at the root and per object
pub const KEY_ROLE: &str = "@role";
pub const KEY_DATABASE: &str = "@database";
pub const KEY_DATASOURCE: &str = "@datasource";
pub const KEY_NAMESPACE: &str = "@namespace";
pub const KEY_CATALOG: &str = "@catalog";
pub const KEY_SCHEMA: &str = "@schema";
pub const KEY_EXPLAIN: &str = "@explain";
pub const KEY_CACHE: &str = "@cache";
pub const KEY_METHOD: &str = "@method";

// Table-node directives
pub const KEY_COLUMN: &str = "@column";
pub const KEY_NULL: &str = "@null";
pub const KEY_CAST: &str = "@cast";
pub const KEY_COMBINE: &str = "@combine";
pub const KEY_GROUP: &str = "@group";
pub const KEY_HAVING: &str = "@having";
pub const KEY_HAVING_AND: &str = "@having&";
pub const KEY_SAMPLE: &str = "@sample";
pub const KEY_LATEST: &str = "@latest";
pub const KEY_PARTITION: &str = "@partition";
pub const KEY_FILL: &str = "@fill";
pub const KEY_ORDER: &str = "@order";
pub const KEY_KEY: &str = "@key";
pub const KEY_RAW: &str = "@raw";

// Array directives
pub const KEY_QUERY: &str = "query";
pub const KEY_COMPAT: &str = "compat";
pub const KEY_COUNT: &str = "count";
pub const KEY_PAGE: &str = "page";
pub const KEY_JOIN: &str = "join";

// Subquery selector
pub const KEY_FROM: &str = "from";

// Meta-method selectors
pub const KEY_GET: &str = "@get";
pub const KEY_GETS: &str = "@gets";
pub const KEY_HEAD: &str = "@head";
pub const KEY_HEADS: &str = "@heads";
pub const KEY_POST: &str = "@post";
pub const KEY_PUT: &str = "@put";
pub const KEY_DELETE: &str = "@delete";

// Response keys
pub const KEY_OK: &str = "ok";
pub const KEY_CODE: &str = "code";
pub const KEY_MSG: &str = "msg";
pub const KEY_WARN: &str = "warn";
pub const KEY_TOTAL: &str = "total";
pub const KEY_INFO: &str = "info";
pub const KEY_MAX: &str = "max";
pub const KEY_MORE: &str = "more";
pub const KEY_FIRST: &str = "first";
pub const KEY_LAST: &str = "last";
pub const KEY_ID: &str = "id";
pub const KEY_ID_IN: &str = "id{}";
pub const KEY_EXPLAIN_RESULT: &str = "explain";

pub const ARRAY_SUFFIX: &str = "[]";

/// Directives copied from a joined table's own block into its sub-request.
pub const JOIN_COPY_KEYS: [&str; 20] = [
    KEY_ROLE,
    KEY_DATABASE,
    KEY_NAMESPACE,
    KEY_CATALOG,
    KEY_SCHEMA,
    KEY_DATASOURCE,
    KEY_COLUMN,
    KEY_NULL,
    KEY_CAST,
    KEY_COMBINE,
    KEY_GROUP,
    KEY_HAVING,
    KEY_HAVING_AND,
    KEY_SAMPLE,
    KEY_LATEST,
    KEY_PARTITION,
    KEY_FILL,
    KEY_ORDER,
    KEY_KEY,
    KEY_RAW,
];

lazy_static! {
    static ref TABLE_PATTERN: Regex = Regex::new(r"^[A-Z][A-Za-z0-9_]*$").unwrap();
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref ALIAS_PATTERN: Regex = Regex::new(r"^[a-z_][A-Za-z0-9_]*$").unwrap();
}

/// Capitalized identifier: `User`, `Comment_v2`.
pub fn is_table_key(key: &str) -> bool {
    TABLE_PATTERN.is_match(key)
}

/// Plain variable name: `id`, `userId`.
pub fn is_name(key: &str) -> bool {
    NAME_PATTERN.is_match(key)
}

/// Lower-case leading identifier used for table aliases.
pub fn is_alias(key: &str) -> bool {
    ALIAS_PATTERN.is_match(key)
}

pub fn is_array_key(key: &str) -> bool {
    key.ends_with(ARRAY_SUFFIX)
}

/// Field whose value is a reference path: `userId@`, but not `@column`.
pub fn is_reference_key(key: &str) -> bool {
    key.len() > 1 && key.ends_with('@') && key.find('@') == Some(key.len() - 1)
}

/// Splits `Table:alias` into `("Table", Some("alias"))`.
pub fn parse_entry(key: &str) -> (&str, Option<&str>) {
    match key.split_once(':') {
        Some((name, alias)) if !alias.is_empty() => (name, Some(alias)),
        Some((name, _)) => (name, None),
        None => (key, None),
    }
}

/// Splits a comma-separated list, trimming and dropping empty items.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits a `/`-joined path, dropping empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
