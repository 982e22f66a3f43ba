use serde_json::Value;

use crate::request::keys::{
    KEY_COUNT, KEY_EXPLAIN_RESULT, KEY_FIRST, KEY_INFO, KEY_LAST, KEY_MAX, KEY_MORE, KEY_PAGE,
    KEY_TOTAL,
};
use crate::request::JsonMap;

/// Pagination metadata for an array queried with `query: TOTAL|ALL`.
/// `page` and `max` are shifted by the configured minimum page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total: usize,
    pub count: usize,
    pub page: i64,
    pub max: i64,
    pub more: bool,
    pub first: bool,
    pub last: bool,
    /// No rows remain at or beyond this page.
    pub exhausted: bool,
}

impl Pagination {
    /// `page` is zero-based.
    pub fn compute(total: usize, count: usize, page: usize, min_page: i64) -> Self {
        let max = if total == 0 || count == 0 {
            0
        } else {
            ((total - 1) / count) as i64
        };
        let page = page as i64 + min_page;
        let max = max + min_page;
        Self {
            total,
            count,
            page,
            max,
            more: page < max,
            first: page == min_page,
            last: page == max,
            exhausted: (total as i64) <= (count as i64) * (page - min_page),
        }
    }

    pub fn to_info(&self, explain: Option<Value>) -> Value {
        let mut info = JsonMap::new();
        if let Some(explain) = explain.filter(Value::is_object) {
            info.insert(KEY_EXPLAIN_RESULT.to_string(), explain);
        }
        info.insert(KEY_TOTAL.to_string(), Value::from(self.total));
        info.insert(KEY_COUNT.to_string(), Value::from(self.count));
        info.insert(KEY_PAGE.to_string(), Value::from(self.page));
        info.insert(KEY_MAX.to_string(), Value::from(self.max));
        info.insert(KEY_MORE.to_string(), Value::from(self.more));
        info.insert(KEY_FIRST.to_string(), Value::from(self.first));
        info.insert(KEY_LAST.to_string(), Value::from(self.last));
        Value::Object(info)
    }
}

/// `(<array path>/total, <array path>/info)` for a main table whose parent
/// path is `<array path>/<row>`.
pub fn result_paths(parent_path: &str) -> Option<(String, String)> {
    let index = parent_path.rfind("]/")?;
    let prefix = &parent_path[..index + 2];
    Some((
        format!("{}{}", prefix, KEY_TOTAL),
        format!("{}{}", prefix, KEY_INFO),
    ))
}
