//! Array directives (`query`, `compat`, `count`, `page`, `join`), pulled out
//! of an array node into a side channel.

use serde_json::Value;

use super::errors::ResolveError;
use crate::config::ResolverConfig;
use crate::request::keys::{
    KEY_COMPAT, KEY_COUNT, KEY_JOIN, KEY_METHOD, KEY_PAGE, KEY_QUERY, KEY_ROLE,
};
use crate::request::{get_bool, get_int, get_string, JsonMap, QueryMode};

/// Removed from the working copy of an array node. `@method` and `@role`
/// are read into the branch before extraction.
const ARRAY_DIRECTIVE_KEYS: [&str; 7] = [
    KEY_QUERY, KEY_COMPAT, KEY_COUNT, KEY_PAGE, KEY_JOIN, KEY_METHOD, KEY_ROLE,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayDirectives {
    pub query: QueryMode,
    pub compat: bool,
    pub count: Option<i64>,
    pub page: Option<i64>,
    pub join: Option<Value>,
}

/// Normalized pagination window of one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Rows per page as sent to the executor.
    pub count: usize,
    /// Zero-based page.
    pub page: usize,
    /// Upper bound the count was checked against.
    pub max: usize,
}

impl ArrayDirectives {
    /// Returns a copy of `node` without the directive keys, plus the
    /// directives. `node` itself is never touched.
    pub fn extract(node: &JsonMap, path: &str) -> Result<(JsonMap, Self), ResolveError> {
        let query = match get_string(node, KEY_QUERY)? {
            None => QueryMode::Table,
            Some(raw) => QueryMode::parse(&raw).ok_or_else(|| {
                ResolveError::Structure(format!(
                    "{}/{}:{} is invalid, expected one of [0, 1, 2] or [TABLE, TOTAL, ALL]",
                    path, KEY_QUERY, raw
                ))
            })?,
        };
        let directives = Self {
            query,
            compat: get_bool(node, KEY_COMPAT)?.unwrap_or(false),
            count: get_int(node, KEY_COUNT)?,
            page: get_int(node, KEY_PAGE)?,
            join: node.get(KEY_JOIN).filter(|v| !v.is_null()).cloned(),
        };

        let working = node
            .iter()
            .filter(|(k, _)| !ARRAY_DIRECTIVE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok((working, directives))
    }

    /// Page shifted to zero-based and range checked; count defaulted (0 for
    /// subqueries) and bounded; a count of 0 means the upper bound.
    pub fn window(
        &self,
        path: &str,
        is_subquery: bool,
        config: &ResolverConfig,
    ) -> Result<PageWindow, ResolveError> {
        let min_page = config.min_query_page();
        let page = match self.page {
            None | Some(0) => Some(0),
            Some(p) => p.checked_sub(min_page),
        };
        let page = match page {
            Some(page) if (0..=config.max_query_page as i64).contains(&page) => page,
            _ => return Err(ResolveError::Structure(format!(
                "{}/{}:{} is out of range, expected {}-{}",
                path,
                KEY_PAGE,
                self.page.unwrap_or_default(),
                min_page,
                config.max_query_page
            ))),
        };

        let count = match (is_subquery, self.count) {
            (_, Some(c)) => c,
            (true, None) => 0,
            (false, None) => config.default_query_count as i64,
        };
        let max = if is_subquery {
            count
        } else {
            config.max_query_count as i64
        };
        if count < 0 || count > max {
            return Err(ResolveError::Structure(format!(
                "{}/{}:{} is out of range, expected 0-{}",
                path, KEY_COUNT, count, max
            )));
        }

        Ok(PageWindow {
            count: if count == 0 { max as usize } else { count as usize },
            page: page as usize,
            max: max as usize,
        })
    }
}
