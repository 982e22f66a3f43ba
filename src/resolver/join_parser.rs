//! Join directive parsing.
//!
//! A join directive names, per joined table, how it attaches to the main
//! table of an array item:
//!
//! ```text
//! <symbol>/[<Arr>[]/]<Table>[:<alias>][/<key>@]
//! ```
//!
//! `&` inner, `<` left, `>` right, `|` full, `*` cross, `@` app join. The
//! on-conditions come from the joined table's own `key@` fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ResolveError;
use super::path_index::{Lookup, ReferenceLookup};
use crate::request::keys::{
    is_alias, is_array_key, is_name, is_reference_key, is_table_key, parse_entry, split_list,
    JOIN_COPY_KEYS, KEY_COUNT, KEY_JOIN, KEY_PAGE,
};
use crate::request::{get_int, JsonMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// Resolved by the engine with a second query instead of SQL.
    App,
}

impl JoinType {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "&" => Some(JoinType::Inner),
            "<" => Some(JoinType::Left),
            ">" => Some(JoinType::Right),
            "|" => Some(JoinType::Full),
            "*" => Some(JoinType::Cross),
            "@" => Some(JoinType::App),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            JoinType::Inner => "&",
            JoinType::Left => "<",
            JoinType::Right => ">",
            JoinType::Full => "|",
            JoinType::Cross => "*",
            JoinType::App => "@",
        }
    }

    pub fn is_sql(&self) -> bool {
        !matches!(self, JoinType::App)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `joined.key = target.target_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnCondition {
    /// Column of the joined table.
    pub key: String,
    /// Field as written, e.g. `userId@`.
    pub origin_key: String,
    /// Reference as written, e.g. `/User/id`.
    pub origin_value: String,
    pub target_table_key: String,
    pub target_table: String,
    pub target_alias: Option<String>,
    pub target_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Path expression as written in the directive.
    pub path: String,
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// `Table` or `Table:alias`, as keyed in the request.
    pub table_key: String,
    /// Enclosing array key for array-scoped app joins.
    pub array_key: Option<String>,
    pub on: Vec<OnCondition>,
    /// Joined table's filters and pass-through directives.
    pub sub_request: JsonMap,
    /// Value of the join directive entry.
    pub overrides: JsonMap,
    /// Outer filter block named by a slash-less directive entry.
    pub outer: Option<JsonMap>,
    /// Rows per main row for array-scoped joins.
    pub count: Option<usize>,
}

impl JoinSpec {
    pub fn is_array_scoped(&self) -> bool {
        self.array_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    pub specs: Vec<JoinSpec>,
    /// Working copy of the array item with on-condition fields moved to the
    /// front of every joined table.
    pub reordered: JsonMap,
}

impl JoinPlan {
    pub fn sql_joins(&self) -> impl Iterator<Item = &JoinSpec> {
        self.specs.iter().filter(|s| s.join_type.is_sql())
    }

    pub fn app_joins(&self) -> impl Iterator<Item = &JoinSpec> {
        self.specs.iter().filter(|s| !s.join_type.is_sql())
    }
}

fn invalid(path: &str, reason: impl fmt::Display) -> ResolveError {
    ResolveError::Structure(format!("join:\"{}\" is invalid: {}", path, reason))
}

/// Parses the `join` value of an array item `request`.
///
/// Returns `None` when there is nothing to join. Fails on the first
/// malformed entry; nothing is returned for the entries before it.
pub fn parse_joins(
    join: Option<&Value>,
    request: &JsonMap,
    refs: &dyn ReferenceLookup,
    default_count: usize,
) -> Result<Option<JoinPlan>, ResolveError> {
    let entries: JsonMap = match join {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => {
            if request.is_empty() {
                return Ok(None);
            }
            split_list(s)
                .into_iter()
                .map(|p| (p.to_string(), Value::Object(JsonMap::new())))
                .collect()
        }
        Some(other) => {
            return Err(ResolveError::Structure(format!(
                "join:{} has the wrong type, expected a string or an object",
                other
            )))
        }
    };

    let mut outer_blocks = JsonMap::new();
    let mut joins = vec![];
    for (path, value) in entries {
        match path.find('/') {
            Some(i) if i > 0 => joins.push((path, value)),
            _ => {
                if request.contains_key(&path) {
                    outer_blocks.insert(path, value);
                } else {
                    log::warn!("join:\"{}\" names no key of the request, ignored", path);
                }
            }
        }
    }
    if joins.is_empty() {
        return Ok(None);
    }

    let mut working = request.clone();
    let mut specs = Vec::with_capacity(joins.len());
    for (path, value) in joins {
        let overrides = match value {
            Value::Object(map) => map,
            _ => return Err(invalid(&path, "the value must be an object")),
        };
        let spec = parse_one(&path, overrides, &mut working, &outer_blocks, refs, default_count)?;
        specs.push(spec);
    }

    Ok(Some(JoinPlan {
        specs,
        reordered: working,
    }))
}

fn parse_one(
    path: &str,
    overrides: JsonMap,
    working: &mut JsonMap,
    outer_blocks: &JsonMap,
    refs: &dyn ReferenceLookup,
    default_count: usize,
) -> Result<JoinSpec, ResolveError> {
    let (symbol, rest) = path.split_once('/').ok_or_else(|| invalid(path, "missing /"))?;
    let join_type = JoinType::from_symbol(symbol).ok_or_else(|| {
        invalid(path, format!("unknown join symbol `{}`, expected one of & < > | * @", symbol))
    })?;

    let (table_part, explicit_key) = match rest.rfind('/') {
        Some(i) if rest[i + 1..].ends_with('@') => (&rest[..i], Some(&rest[i + 1..])),
        _ => (rest, None),
    };
    let (array_key, table_key) = match table_part.rfind('/') {
        Some(i) => (Some(&table_part[..i]), &table_part[i + 1..]),
        None => (None, table_part),
    };
    if let Some(array_key) = array_key {
        if !is_array_key(array_key) || array_key.contains('/') {
            return Err(invalid(
                path,
                format!("`{}` must be a single array key such as Comment[]", array_key),
            ));
        }
    }

    let (table, alias) = parse_entry(table_key);
    if !is_table_key(table) {
        return Err(invalid(path, format!("table `{}` must match ^[A-Z][A-Za-z0-9_]*$", table)));
    }
    if let Some(alias) = alias {
        if !is_alias(alias) {
            return Err(invalid(path, format!("alias `{}` must match ^[a-z_][A-Za-z0-9_]*$", alias)));
        }
    }

    let parent = match array_key {
        Some(array_key) => working
            .get(array_key)
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| invalid(path, format!("{} must be an object of the request", array_key)))?,
        None => working.clone(),
    };
    let table_obj = parent
        .get(table_key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| invalid(path, format!("{} must be an object of the request", table_key)))?;

    let mut count = None;
    if let Some(array_key) = array_key {
        if parent.get(KEY_JOIN).is_some_and(|v| !v.is_null()) {
            return Err(invalid(path, format!("{} must not carry its own join", array_key)));
        }
        if get_int(&parent, KEY_PAGE)?.is_some_and(|p| p != 0) {
            return Err(invalid(path, format!("{}/page must be null or 0", array_key)));
        }
        count = Some(match get_int(&parent, KEY_COUNT)? {
            Some(c) if c > 0 => c as usize,
            _ => default_count,
        });
    }

    let is_app = join_type == JoinType::App;
    let mut references = JsonMap::new();
    if let Some(key) = explicit_key {
        if !is_reference_key(key) {
            return Err(invalid(path, format!("`{}` must end with a single @", key)));
        }
        let target = table_obj
            .get(key)
            .filter(|v| v.is_string())
            .ok_or_else(|| invalid(path, format!("{}/{} must be a string reference", table_key, key)))?;
        if is_app && !is_name(&key[..key.len() - 1]) {
            return Err(invalid(path, format!("app join key `{}` is not a name", key)));
        }
        references.insert(key.to_string(), target.clone());
    }

    let mut sub_request = JsonMap::new();
    for (k, v) in &table_obj {
        if v.is_null() || Some(k.as_str()) == explicit_key {
            continue;
        }
        if let (true, Value::String(sv)) = (is_reference_key(k), v) {
            if explicit_key.is_none() && names_top_level_table(sv, working) {
                if is_app && !references.is_empty() {
                    return Err(invalid(path, "an app join takes exactly one on-condition"));
                }
                if is_app && !is_name(&k[..k.len() - 1]) {
                    return Err(invalid(path, format!("app join key `{}` is not a name", k)));
                }
                references.insert(k.clone(), v.clone());
                continue;
            }
            match refs.lookup_reference(sv) {
                Lookup::Found(resolved) if resolved != *v => {
                    sub_request.insert(k[..k.len() - 1].to_string(), resolved);
                    continue;
                }
                _ => {
                    return Err(invalid(
                        path,
                        format!("{}/{}:\"{}\" is neither a table reference nor resolvable", table_key, k, sv),
                    ))
                }
            }
        }
        if k.starts_with('@') {
            if JOIN_COPY_KEYS.contains(&k.as_str()) {
                sub_request.insert(k.clone(), v.clone());
            }
            continue;
        }
        if k.ends_with('@') {
            return Err(invalid(path, format!("{}/{} must be a string reference", table_key, k)));
        }
        if !k.contains("()") && !v.is_object() {
            sub_request.insert(k.clone(), v.clone());
        }
    }

    if references.is_empty() && join_type != JoinType::Cross {
        return Err(invalid(path, format!("{} has no on-condition, add a key@ reference", table_key)));
    }

    let mut on = Vec::with_capacity(references.len());
    for (origin_key, target) in &references {
        on.push(parse_on(path, origin_key, target.as_str().unwrap_or_default(), working)?);
    }

    if references.len() != table_obj.len() {
        let mut reordered = references.clone();
        for (k, v) in &table_obj {
            if !reordered.contains_key(k) {
                reordered.insert(k.clone(), v.clone());
            }
        }
        let slot = match array_key {
            Some(array_key) => working
                .get_mut(array_key)
                .and_then(Value::as_object_mut)
                .and_then(|m| m.get_mut(table_key)),
            None => working.get_mut(table_key),
        };
        if let Some(slot) = slot {
            *slot = Value::Object(reordered);
        }
    }

    log::debug!("join {} {} with {} on-condition(s)", join_type, table_key, on.len());
    Ok(JoinSpec {
        path: path.to_string(),
        join_type,
        table: table.to_string(),
        alias: alias.map(str::to_string),
        table_key: table_key.to_string(),
        array_key: array_key.map(str::to_string),
        on,
        sub_request,
        overrides,
        outer: outer_blocks.get(table).and_then(Value::as_object).cloned(),
        count,
    })
}

/// `/Table[:alias]/key` where `Table[:alias]` is an object of `request`.
fn names_top_level_table(reference: &str, request: &JsonMap) -> bool {
    let Some(rest) = reference.strip_prefix('/') else {
        return false;
    };
    let Some((table_key, key)) = rest.split_once('/') else {
        return false;
    };
    !key.contains('/')
        && is_table_key(parse_entry(table_key).0)
        && request.get(table_key).is_some_and(Value::is_object)
}

fn parse_on(
    path: &str,
    origin_key: &str,
    target: &str,
    request: &JsonMap,
) -> Result<OnCondition, ResolveError> {
    let key = &origin_key[..origin_key.len() - 1];
    if !is_name(key) {
        return Err(invalid(path, format!("`{}` is not a name", origin_key)));
    }
    let (target_path, target_key) = target
        .rsplit_once('/')
        .ok_or_else(|| invalid(path, format!("`{}` must look like /Table/key", target)))?;
    if !is_name(target_key) {
        return Err(invalid(path, format!("`{}` in {} is not a name", target_key, target)));
    }
    let target_table_key = target_path.rsplit('/').next().unwrap_or(target_path);
    let (target_table, target_alias) = parse_entry(target_table_key);
    if !is_table_key(target_table) {
        return Err(invalid(path, format!("`{}` in {} is not a table", target_table, target)));
    }
    if target_alias.is_some_and(|a| !is_alias(a)) {
        return Err(invalid(path, format!("`{}` has an invalid alias", target_table_key)));
    }
    if !request.get(target_table_key).is_some_and(Value::is_object) {
        return Err(invalid(path, format!("target {} does not exist in the request", target_table_key)));
    }
    Ok(OnCondition {
        key: key.to_string(),
        origin_key: origin_key.to_string(),
        origin_value: target.to_string(),
        target_table_key: target_table_key.to_string(),
        target_table: target_table.to_string(),
        target_alias: target_alias.map(str::to_string),
        target_key: target_key.to_string(),
    })
}
