//! Resolution of array nodes (`Table[]`, `Table-key[]`, `[]`).

use serde_json::Value;

use super::context::{ArrayScope, Branch, JoinedRows, ResolveCtx};
use super::directives::ArrayDirectives;
use super::errors::ResolveError;
use super::join_parser::parse_joins;
use super::object_resolver::{branch_of, resolve_object};
use super::path_index::abs_path;
use crate::request::keys::{is_table_key, parse_entry, ARRAY_SUFFIX, KEY_FROM};
use crate::request::{get_string, is_primitive, JsonMap};

/// Resolves the array node `name` under `parent_path` into its rows.
///
/// In subquery mode the item is resolved once, in place, and the inner
/// table leaves its query in `ctx.subquery`. Returns `None` when no row was
/// produced. The caller's `node` is never modified.
pub fn resolve_array(
    ctx: &mut ResolveCtx<'_>,
    node: Option<&JsonMap>,
    parent_path: &str,
    name: &str,
    is_subquery: bool,
    branch: &Branch,
) -> Result<Option<Vec<Value>>, ResolveError> {
    let Some(node) = node else {
        return Ok(None);
    };
    let path = abs_path(parent_path, name);
    let branch = branch_of(node, branch, &path)?;
    if !is_subquery && !branch.method.is_get(true) {
        return Err(ResolveError::Forbidden(format!(
            "{}: arrays are only allowed under GET and GETS, not {}",
            path, branch.method
        )));
    }
    if node.is_empty() {
        return Ok(None);
    }

    let (mut working, directives) = ArrayDirectives::extract(node, &path)?;
    let window = directives.window(&path, is_subquery, ctx.config)?;
    if working.is_empty() {
        return Ok(None);
    }

    let child_keys = extraction_keys(name, &working);
    let arr_table_key = child_keys
        .as_ref()
        .filter(|keys| keys.len() == 1 && is_table_key(&keys[0]))
        .map(|keys| keys[0].clone());

    let default_count = ctx.config.default_query_count;
    let plan = parse_joins(directives.join.as_ref(), &working, &*ctx, default_count)?;
    let (sql_joins, app_joins) = match plan {
        Some(plan) => {
            let sql = plan.sql_joins().cloned().collect::<Vec<_>>();
            let app = plan.app_joins().cloned().collect::<Vec<_>>();
            working = plan.reordered;
            (sql, app)
        }
        None => (vec![], vec![]),
    };
    let has_joins = !sql_joins.is_empty() || !app_joins.is_empty();

    let main_key = if is_subquery {
        get_string(&working, KEY_FROM)?
    } else {
        working
            .iter()
            .find(|(k, v)| v.is_object() && is_table_key(parse_entry(k).0))
            .map(|(k, _)| k.clone())
    };

    let served = match ctx.join_rows.remove(&path) {
        Some(JoinedRows::Many(rows)) => Some(rows),
        Some(JoinedRows::One(row)) => Some(row.into_iter().collect()),
        None => None,
    };
    if let (Some(rows), Some(main_key)) = (&served, &main_key) {
        for (i, row) in rows.iter().enumerate() {
            let row_path = abs_path(&abs_path(&path, &i.to_string()), main_key);
            ctx.join_rows.insert(row_path, JoinedRows::One(Some(row.clone())));
        }
    }

    let spliceable = !is_subquery
        && !has_joins
        && served.is_none()
        && working.len() == 1
        && arr_table_key.as_ref().is_some_and(|key| {
            working
                .get(key)
                .and_then(Value::as_object)
                .is_some_and(|table| !table.values().any(Value::is_object))
        });

    let size = match (&served, is_subquery) {
        (_, true) => 1,
        (Some(rows), false) => rows.len(),
        (None, false) => window.count,
    };
    let mut scope = ArrayScope {
        path: path.clone(),
        method: branch.method,
        query: directives.query,
        compat: directives.compat,
        window,
        position: 0,
        main_key,
        sql_joins,
        app_joins,
    };

    let mut response = vec![];
    for i in 0..size {
        scope.position = i;
        let (item_parent, item_name) = if is_subquery {
            (parent_path.to_string(), name.to_string())
        } else {
            (path.clone(), i.to_string())
        };
        let item = resolve_object(
            ctx,
            Some(&working),
            &item_parent,
            &item_name,
            Some(&scope),
            &branch,
            is_subquery,
        )?;
        let Some(item) = item.filter(|item| !item.is_empty()) else {
            break;
        };

        if i == 0 && spliceable {
            let rows = ctx.raw_rows.get(&path).cloned().unwrap_or_default();
            if let (Some(table_key), false) = (&arr_table_key, rows.is_empty()) {
                log::debug!("{} spliced {} raw row(s)", path, rows.len());
                for (j, row) in rows.into_iter().enumerate() {
                    let row_path = abs_path(&abs_path(&path, &j.to_string()), table_key);
                    ctx.record(&row_path, Value::Object(row.clone()));
                    response.push(Value::Object(row));
                }
                break;
            }
        }
        response.push(extract(item, child_keys.as_deref()));
    }

    ctx.raw_rows.remove(&path);
    ctx.main_cache.remove(&path);

    if response.first().is_some_and(is_primitive) {
        ctx.record(&path, Value::Array(response.clone()));
    }
    log::debug!("{} resolved {} row(s)", path, response.len());
    Ok((!response.is_empty()).then_some(response))
}

/// `User-id[]` extracts `["User", "id"]` from every item; `[]` keeps whole
/// items. Only applies when the item holds the first key.
fn extraction_keys(name: &str, item: &JsonMap) -> Option<Vec<String>> {
    let base = name.strip_suffix(ARRAY_SUFFIX).unwrap_or(name);
    let (base, _) = parse_entry(base);
    if base.is_empty() {
        return None;
    }
    let keys: Vec<String> = base.split('-').map(str::to_string).collect();
    item.contains_key(&keys[0]).then_some(keys)
}

fn extract(item: JsonMap, keys: Option<&[String]>) -> Value {
    let Some(keys) = keys else {
        return Value::Object(item);
    };
    keys.iter().fold(Value::Object(item), |current, key| match current {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}
