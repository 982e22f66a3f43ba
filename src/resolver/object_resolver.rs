//! Resolution of object nodes: table nodes become rows, other nodes are
//! resolved child by child in document order.

use serde_json::Value;

use super::app_join;
use super::array_resolver::resolve_array;
use super::context::{ArrayScope, Branch, JoinedRows, ResolveCtx};
use super::errors::ResolveError;
use super::operation;
use super::pagination::{result_paths, Pagination};
use super::path_index::{abs_path, value_path, ReferenceLookup};
use crate::request::keys::{
    is_array_key, is_reference_key, is_table_key, parse_entry, KEY_COUNT, KEY_EXPLAIN_RESULT,
    KEY_METHOD, KEY_ROLE,
};
use crate::request::{get_string, JsonMap, QueryMode, RequestMethod};

/// Resolves the node `name` under `parent_path`.
///
/// `scope` is set for the direct children of an array item. Returns `None`
/// when the node produced nothing; for an array item that happens whenever
/// its main table produced nothing.
pub fn resolve_object(
    ctx: &mut ResolveCtx<'_>,
    node: Option<&JsonMap>,
    parent_path: &str,
    name: &str,
    scope: Option<&ArrayScope>,
    branch: &Branch,
    is_subquery: bool,
) -> Result<Option<JsonMap>, ResolveError> {
    let Some(node) = node else {
        return Ok(None);
    };
    let position = scope.map_or(0, |s| s.position);
    ctx.depth.enter(parent_path, name, position)?;

    let path = abs_path(parent_path, name);
    let branch = branch_of(node, branch, &path)?;

    if is_table_key(parse_entry(name).0) {
        return resolve_table(ctx, node, parent_path, name, &path, scope, &branch, is_subquery);
    }

    let resolved = resolve_children(
        ctx,
        node,
        parent_path,
        &path,
        JsonMap::new(),
        Children::Plain { scope, is_subquery },
        &branch,
    )?;
    if let (Some(resolved), false) = (&resolved, path.is_empty()) {
        ctx.record(&path, Value::Object(resolved.clone()));
    }
    Ok(resolved)
}

/// Applies the node's own `@method` and `@role` to the inherited branch.
pub(crate) fn branch_of(node: &JsonMap, inherited: &Branch, path: &str) -> Result<Branch, ResolveError> {
    let mut branch = inherited.clone();
    if let Some(method) = get_string(node, KEY_METHOD)? {
        branch.method = method
            .parse()
            .map_err(|e| ResolveError::Structure(format!("{}/{}: {}", path, KEY_METHOD, e)))?;
    }
    if let Some(role) = get_string(node, KEY_ROLE)? {
        branch.role = Some(role);
    }
    Ok(branch)
}

#[allow(clippy::too_many_arguments)]
fn resolve_table(
    ctx: &mut ResolveCtx<'_>,
    node: &JsonMap,
    parent_path: &str,
    name: &str,
    path: &str,
    scope: Option<&ArrayScope>,
    branch: &Branch,
    is_subquery: bool,
) -> Result<Option<JsonMap>, ResolveError> {
    if let Some(joined) = ctx.join_rows.get(path).cloned() {
        let row = match joined {
            JoinedRows::One(row) => row,
            JoinedRows::Many(rows) => rows.into_iter().next(),
        };
        log::debug!("{} served by a join", path);
        return finish(ctx, node, parent_path, path, row, branch);
    }

    if is_subquery {
        let Some(operation) = operation::build(ctx, node, parent_path, name, branch, None)? else {
            return Ok(None);
        };
        let (count, page) = scope.map_or((0, 0), |s| (s.window.count, s.window.page));
        let mut query = operation.descriptor.with_window(count, page, 0);
        query.method = RequestMethod::Get;
        ctx.subquery = Some(query);
        return Ok(Some(JsonMap::new()));
    }

    let array_main = scope.filter(|s| s.is_main(name) && s.method.is_get(true));
    let position = scope.map_or(0, |s| s.position);

    let cached = match array_main {
        Some(s) if position > 0 => ctx
            .main_cache
            .get(&s.path)
            .map(|op| op.rebind(parent_path, position)),
        _ => None,
    };
    let operation = match cached {
        Some(operation) => operation,
        None => {
            let Some(operation) = operation::build(ctx, node, parent_path, name, branch, scope)? else {
                return Ok(None);
            };
            if ctx.config.verify_role {
                ctx.verifier.verify_access(&operation.descriptor)?;
            }
            operation
        }
    };

    let Some(scope) = array_main else {
        let query = operation.descriptor.clone().with_window(1, 0, 0);
        let outcome = ctx.execute(&query)?;
        let mut row = outcome.row;
        if let (Some(row), Some(explain)) = (row.as_mut(), outcome.explain) {
            row.insert(KEY_EXPLAIN_RESULT.to_string(), explain);
        }
        return finish(ctx, node, parent_path, path, row.filter(|r| !r.is_empty()), branch);
    };

    if position == 0 && scope.query != QueryMode::Table {
        let descriptor = &operation.descriptor;
        let counts_groups = descriptor.has_aggregate() || descriptor.group.is_some();
        let count_query = if scope.compat || counts_groups {
            descriptor.wrapped_count_query()
        } else {
            descriptor.count_query()
        };
        let outcome = ctx.execute(&count_query)?;
        let total = outcome
            .row
            .as_ref()
            .and_then(|r| r.get(KEY_COUNT))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let pagination = Pagination::compute(
            total,
            scope.window.count,
            scope.window.page,
            ctx.config.min_query_page(),
        );
        if let Some((total_path, info_path)) = result_paths(parent_path) {
            ctx.record(&total_path, Value::from(total));
            ctx.record(&info_path, pagination.to_info(outcome.explain));
        }
        if scope.query == QueryMode::Total || pagination.exhausted {
            return Ok(None);
        }
    }

    let query = operation
        .descriptor
        .clone()
        .with_window(scope.window.count, scope.window.page, position);
    let outcome = ctx.execute(&query)?;
    for (table_key, joined) in &outcome.joined {
        ctx.join_rows.insert(
            abs_path(parent_path, table_key),
            JoinedRows::One(joined.as_object().cloned()),
        );
    }

    let mut row = outcome.row;
    if position == 0 {
        let page_rows = outcome.page_rows.unwrap_or_default();
        if !scope.app_joins.is_empty() {
            app_join::run(ctx, scope, &page_rows)?;
        }
        if let (Some(row), Some(explain)) = (row.as_mut(), outcome.explain) {
            row.insert(KEY_EXPLAIN_RESULT.to_string(), explain);
        } else {
            ctx.raw_rows.insert(scope.path.clone(), page_rows);
        }
        ctx.main_cache.insert(scope.path.clone(), operation);
    }
    finish(ctx, node, parent_path, path, row.filter(|r| !r.is_empty()), branch)
}

/// Records the row, then resolves the table's nested children into it.
fn finish(
    ctx: &mut ResolveCtx<'_>,
    node: &JsonMap,
    parent_path: &str,
    path: &str,
    row: Option<JsonMap>,
    branch: &Branch,
) -> Result<Option<JsonMap>, ResolveError> {
    let Some(row) = row else {
        return Ok(None);
    };
    ctx.record(path, Value::Object(row.clone()));
    if !node.values().any(Value::is_object) {
        return Ok(Some(row));
    }
    let resolved = resolve_children(ctx, node, parent_path, path, row, Children::OfTable, branch)?;
    if let Some(resolved) = &resolved {
        ctx.record(path, Value::Object(resolved.clone()));
    }
    Ok(resolved)
}

#[derive(Clone, Copy)]
enum Children<'s> {
    /// Fields of a table node are query inputs; only objects are children.
    OfTable,
    Plain {
        scope: Option<&'s ArrayScope>,
        is_subquery: bool,
    },
}

fn resolve_children(
    ctx: &mut ResolveCtx<'_>,
    node: &JsonMap,
    parent_path: &str,
    path: &str,
    mut out: JsonMap,
    kind: Children<'_>,
    branch: &Branch,
) -> Result<Option<JsonMap>, ResolveError> {
    check_child_counts(ctx, node, path)?;
    let (scope, is_subquery) = match kind {
        Children::OfTable => (None, false),
        Children::Plain { scope, is_subquery } => (scope, is_subquery),
    };

    for (key, value) in node {
        match value {
            Value::Object(child) if is_array_key(key) => {
                if let Some(list) = resolve_array(ctx, Some(child), path, key, false, branch)? {
                    out.insert(key.clone(), Value::Array(list));
                }
            }
            Value::Object(_) if is_reference_key(key) || key.starts_with('@') => {}
            Value::Object(child) => {
                let child_scope = scope.filter(|_| is_table_key(parse_entry(key).0));
                let is_main = child_scope.is_some_and(|s| s.is_main(key));
                let resolved = resolve_object(
                    ctx,
                    Some(child),
                    path,
                    key,
                    child_scope,
                    branch,
                    is_subquery && is_main,
                )?;
                match resolved {
                    Some(row) => {
                        out.insert(key.clone(), Value::Object(row));
                    }
                    None if is_main => return Ok(None),
                    None => {}
                }
            }
            _ if matches!(kind, Children::OfTable) || key.starts_with('@') => {}
            Value::String(reference) if is_reference_key(key) => {
                let target = value_path(parent_path, reference);
                match ctx.lookup_reference(&target).into_value() {
                    Some(resolved) => {
                        out.insert(key[..key.len() - 1].to_string(), resolved);
                    }
                    None => ctx.warn(path, format!("{}:\"{}\" resolved to null", key, reference)),
                }
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Some(out))
}

fn check_child_counts(ctx: &ResolveCtx<'_>, node: &JsonMap, path: &str) -> Result<(), ResolveError> {
    let objects = node
        .iter()
        .filter(|(k, v)| v.is_object() && is_table_key(parse_entry(k).0))
        .count();
    if objects > ctx.config.max_object_count {
        return Err(ResolveError::Structure(format!(
            "{} holds {} tables, which exceeds the limit of {}",
            display(path),
            objects,
            ctx.config.max_object_count
        )));
    }
    let arrays = node
        .iter()
        .filter(|(k, v)| v.is_object() && is_array_key(k))
        .count();
    if arrays > ctx.config.max_array_count {
        return Err(ResolveError::Structure(format!(
            "{} holds {} arrays, which exceeds the limit of {}",
            display(path),
            arrays,
            ctx.config.max_array_count
        )));
    }
    Ok(())
}

fn display(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}
