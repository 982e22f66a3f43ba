//! Query construction for one table node.

use serde_json::Value;

use super::array_resolver::resolve_array;
use super::context::{ArrayScope, Branch, ResolveCtx};
use super::errors::ResolveError;
use super::path_index::{abs_path, value_path, Lookup, ReferenceLookup, ReferencePolicy};
use crate::executor::{Condition, QueryDescriptor};
use crate::request::keys::{
    is_array_key, is_reference_key, parse_entry, split_list, JOIN_COPY_KEYS, KEY_CACHE,
    KEY_CATALOG, KEY_COLUMN, KEY_COMBINE, KEY_DATABASE, KEY_DATASOURCE, KEY_EXPLAIN, KEY_FROM,
    KEY_GROUP, KEY_HAVING, KEY_METHOD, KEY_NAMESPACE, KEY_ORDER, KEY_ROLE, KEY_SCHEMA,
};
use crate::request::{get_bool, get_string, JsonMap, RequestMethod};

/// A table node turned into a query, bound to where it sits in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOperation {
    pub parent_path: String,
    pub name: String,
    pub descriptor: QueryDescriptor,
}

impl NodeOperation {
    /// Same query for another row of the same array.
    pub fn rebind(&self, parent_path: &str, position: usize) -> Self {
        let mut rebound = self.clone();
        rebound.parent_path = parent_path.to_string();
        rebound.descriptor.position = position;
        rebound
    }
}

/// Builds the operation of the table node `name` under `parent_path`.
///
/// Returns `None` when a reference of the node resolves to nothing and the
/// node is to be skipped.
pub fn build(
    ctx: &mut ResolveCtx<'_>,
    node: &JsonMap,
    parent_path: &str,
    name: &str,
    branch: &Branch,
    scope: Option<&ArrayScope>,
) -> Result<Option<NodeOperation>, ResolveError> {
    let path = abs_path(parent_path, name);
    let (table, alias) = parse_entry(name);

    let mut query = QueryDescriptor::new(branch.method, table);
    query.alias = alias.map(str::to_string);
    query.role = branch.role.clone().or_else(|| ctx.globals.role.clone());
    query.database = ctx.globals.database.clone();
    query.schema = ctx.globals.schema.clone();
    query.datasource = ctx.globals.datasource.clone();
    query.namespace = ctx.globals.namespace.clone();
    query.catalog = ctx.globals.catalog.clone();
    query.cache = ctx.globals.cache.clone();
    query.explain = ctx.globals.explain;

    for (key, value) in node {
        match key.as_str() {
            KEY_METHOD | KEY_ROLE => {}
            KEY_COLUMN => {
                if let Some(columns) = get_string(node, key)? {
                    query.columns = split_list(&columns).into_iter().map(str::to_string).collect();
                }
            }
            KEY_GROUP => query.group = get_string(node, key)?,
            KEY_HAVING => query.having = get_string(node, key)?,
            KEY_ORDER => query.order = get_string(node, key)?,
            KEY_DATABASE => query.database = get_string(node, key)?.or(query.database),
            KEY_SCHEMA => query.schema = get_string(node, key)?.or(query.schema),
            KEY_DATASOURCE => query.datasource = get_string(node, key)?.or(query.datasource),
            KEY_NAMESPACE => query.namespace = get_string(node, key)?.or(query.namespace),
            KEY_CATALOG => query.catalog = get_string(node, key)?.or(query.catalog),
            KEY_CACHE => query.cache = get_string(node, key)?.or(query.cache),
            KEY_EXPLAIN => query.explain = get_bool(node, key)?.unwrap_or(query.explain),
            KEY_COMBINE if !branch.method.is_public() => {
                return Err(ResolveError::Structure(format!(
                    "{}/{} is only allowed under GET and HEAD, not {}",
                    path, key, branch.method
                )));
            }
            _ if key.starts_with('@') => {
                if JOIN_COPY_KEYS.contains(&key.as_str()) {
                    query.directives.insert(key.clone(), value.clone());
                } else {
                    log::debug!("{}/{} ignored", path, key);
                }
            }
            _ if key.contains("()") => {
                return Err(ResolveError::Structure(format!(
                    "{}/{}: function calls are not supported",
                    path, key
                )));
            }
            _ if is_reference_key(key) => {
                let field = &key[..key.len() - 1];
                match value {
                    Value::String(reference) => {
                        let target = value_path(parent_path, reference);
                        match ctx.lookup_reference(&target) {
                            Lookup::Found(resolved) => {
                                query.conditions.push(Condition::value(field, resolved))
                            }
                            Lookup::Null if ctx.config.reference_policy == ReferencePolicy::Strict => {
                                return Err(ResolveError::Reference {
                                    path: abs_path(&path, key),
                                    reference: reference.clone(),
                                });
                            }
                            Lookup::Null | Lookup::Missing => {
                                ctx.warn(
                                    &path,
                                    format!("{}:\"{}\" resolved to null, node skipped", key, reference),
                                );
                                return Ok(None);
                            }
                        }
                    }
                    Value::Object(sub) => {
                        let sub_query = resolve_subquery(ctx, sub, &path, key)?;
                        query.conditions.push(Condition::subquery(field, sub_query));
                    }
                    _ => {
                        return Err(ResolveError::Structure(format!(
                            "{}/{} must be a reference path or a subquery object",
                            path, key
                        )));
                    }
                }
            }
            _ if is_array_key(key) && !value.is_object() => {
                return Err(ResolveError::Structure(format!(
                    "{}/{} must be an object",
                    path, key
                )));
            }
            _ if value.is_object() => {}
            _ => query.conditions.push(Condition::value(key.clone(), value.clone())),
        }
    }

    if let Some(scope) = scope.filter(|s| s.is_main(name)) {
        query.joins = scope.sql_joins.clone();
    }

    log::debug!(
        "{} {} with {} condition(s)",
        query.method,
        path,
        query.conditions.len()
    );
    Ok(Some(NodeOperation {
        parent_path: parent_path.to_string(),
        name: name.to_string(),
        descriptor: query,
    }))
}

/// Resolves `"key@": {"from": "Table", "Table": {...}}` into the inner
/// table's query, without executing it.
fn resolve_subquery(
    ctx: &mut ResolveCtx<'_>,
    sub: &JsonMap,
    path: &str,
    key: &str,
) -> Result<QueryDescriptor, ResolveError> {
    let from = get_string(sub, KEY_FROM)?.ok_or_else(|| {
        ResolveError::Structure(format!("{}/{} needs a from:Table entry", path, key))
    })?;
    if !sub.get(&from).is_some_and(Value::is_object) {
        return Err(ResolveError::Structure(format!(
            "{}/{}/from:{} names no object of the subquery",
            path, key, from
        )));
    }

    let outer = ctx.subquery.take();
    let resolved = resolve_array(ctx, Some(sub), path, key, true, &Branch::new(RequestMethod::Get));
    let inner = ctx.subquery.take();
    ctx.subquery = outer;
    resolved?;

    inner.ok_or_else(|| {
        ResolveError::Structure(format!("{}/{}: subquery on {} produced no query", path, key, from))
    })
}
