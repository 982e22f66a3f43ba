//! App joins (`@/Table/key@`): one extra query per join for a whole page of
//! main rows, split back into per-row results.

use serde_json::Value;

use super::context::{ArrayScope, JoinedRows, ResolveCtx};
use super::errors::ResolveError;
use super::join_parser::{JoinSpec, OnCondition};
use super::path_index::abs_path;
use crate::executor::filter::values_equal;
use crate::executor::{Condition, QueryDescriptor};
use crate::request::keys::{
    split_list, KEY_COLUMN, KEY_DATABASE, KEY_DATASOURCE, KEY_GROUP, KEY_HAVING, KEY_ORDER,
    KEY_ROLE, KEY_SCHEMA,
};
use crate::request::{JsonMap, RequestMethod};

/// Fetches every app join of `scope` for the main rows of its current page
/// and stores the matches under each row's path.
pub fn run(ctx: &mut ResolveCtx<'_>, scope: &ArrayScope, page_rows: &[JsonMap]) -> Result<(), ResolveError> {
    for spec in &scope.app_joins {
        let Some(on) = spec.on.first() else {
            continue;
        };
        if !scope.is_main(&on.target_table_key) {
            ctx.warn(
                &scope.path,
                format!("app join {} must reference the main table of the array", spec.path),
            );
            continue;
        }

        let mut values: Vec<Value> = vec![];
        for value in page_rows.iter().filter_map(|r| r.get(&on.target_key)) {
            if !value.is_null() && !values.iter().any(|v| values_equal(v, value)) {
                values.push(value.clone());
            }
        }
        let rows = if values.is_empty() {
            vec![]
        } else {
            fetch(ctx, spec, on, values)?
        };
        log::debug!("app join {} fetched {} row(s)", spec.path, rows.len());

        let per_row = spec.count.unwrap_or(ctx.config.default_query_count);
        for (i, main_row) in page_rows.iter().enumerate() {
            let matched = main_row
                .get(&on.target_key)
                .filter(|v| !v.is_null())
                .map(|target| {
                    rows.iter()
                        .filter(|r| r.get(&on.key).is_some_and(|c| values_equal(c, target)))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let row_path = abs_path(&scope.path, &i.to_string());
            match &spec.array_key {
                Some(array_key) => ctx.join_rows.insert(
                    abs_path(&row_path, array_key),
                    JoinedRows::Many(matched.into_iter().take(per_row).collect()),
                ),
                None => ctx.join_rows.insert(
                    abs_path(&row_path, &spec.table_key),
                    JoinedRows::One(matched.into_iter().next()),
                ),
            };
        }
    }
    Ok(())
}

fn fetch(
    ctx: &mut ResolveCtx<'_>,
    spec: &JoinSpec,
    on: &OnCondition,
    values: Vec<Value>,
) -> Result<Vec<JsonMap>, ResolveError> {
    let mut query = QueryDescriptor::new(RequestMethod::Get, spec.table.clone());
    query.alias = spec.alias.clone();
    query.role = ctx.globals.role.clone();
    query.database = ctx.globals.database.clone();
    query.schema = ctx.globals.schema.clone();
    query.datasource = ctx.globals.datasource.clone();

    for (key, value) in &spec.sub_request {
        let text = value.as_str().map(str::to_string);
        match key.as_str() {
            KEY_COLUMN => {
                let mut columns: Vec<String> = text
                    .as_deref()
                    .map(split_list)
                    .unwrap_or_default()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if !columns.is_empty() && !columns.contains(&on.key) {
                    columns.push(on.key.clone());
                }
                query.columns = columns;
            }
            KEY_ORDER => query.order = text,
            KEY_GROUP => query.group = text,
            KEY_HAVING => query.having = text,
            KEY_ROLE => query.role = text.or(query.role),
            KEY_DATABASE => query.database = text.or(query.database),
            KEY_SCHEMA => query.schema = text.or(query.schema),
            KEY_DATASOURCE => query.datasource = text.or(query.datasource),
            _ if key.starts_with('@') => {
                query.directives.insert(key.clone(), value.clone());
            }
            _ => query.conditions.push(Condition::value(key.clone(), value.clone())),
        }
    }
    query
        .conditions
        .push(Condition::value(format!("{}{{}}", on.key), Value::Array(values)));
    let query = query.with_window(0, 0, 0);

    if ctx.config.verify_role {
        ctx.verifier.verify_access(&query)?;
    }
    Ok(ctx.execute(&query)?.page_rows.unwrap_or_default())
}
