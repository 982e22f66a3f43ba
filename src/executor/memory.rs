//! In-process executor over tables of JSON rows.
//!
//! `MemoryStore` is shared between requests behind a `std::sync::RwLock`.
//! Reads outside a transaction see the shared store; inside a transaction
//! every statement runs against a private working copy that is written back
//! table by table on commit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::descriptor::{ConditionValue, QueryDescriptor};
use super::errors::DatabaseError;
use super::filter::{parse_condition_key, sort_order, values_equal, Operator, Predicate};
use super::{ExecOutcome, ExecStats, SqlExecutor, TransactionIsolation};
use crate::request::keys::{self, is_name};
use crate::request::{JsonMap, RequestMethod};
use crate::resolver::join_parser::{JoinSpec, JoinType};

lazy_static! {
    static ref FUNCTION_PATTERN: Regex =
        Regex::new(r"^([A-Za-z_]+)\(\s*(\*|[A-Za-z_][A-Za-z0-9_]*)\s*\)$").unwrap();
    static ref HAVING_PATTERN: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|!=|>|<|=)\s*(.+)$").unwrap();
}

pub type SharedStore = Arc<RwLock<MemoryStore>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<JsonMap>>,
}

impl MemoryStore {
    pub fn from_yaml_str(content: &str) -> Result<Self, DatabaseError> {
        serde_yaml::from_str(content).map_err(|e| DatabaseError::Backend(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, DatabaseError> {
        serde_json::from_str(content).map_err(|e| DatabaseError::Backend(e.to_string()))
    }

    /// Loads a `.json` file as JSON and anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::Backend(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Adds a table; non-object rows are skipped.
    pub fn with_table(mut self, name: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.tables.insert(name.to_string(), rows);
        self
    }

    pub fn table(&self, name: &str) -> Option<&Vec<JsonMap>> {
        self.tables.get(name)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    fn rows(&self, name: &str) -> Result<&Vec<JsonMap>, DatabaseError> {
        self.tables
            .get(name)
            .ok_or_else(|| DatabaseError::UnknownTable(name.to_string()))
    }

    fn rows_mut(&mut self, name: &str) -> Result<&mut Vec<JsonMap>, DatabaseError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DatabaseError::UnknownTable(name.to_string()))
    }
}

/// A selected row plus the rows joined onto it, keyed by joined table key.
#[derive(Debug, Clone)]
struct SelectedRow {
    row: JsonMap,
    joined: JsonMap,
}

impl SelectedRow {
    fn plain(row: JsonMap) -> Self {
        Self {
            row,
            joined: JsonMap::new(),
        }
    }
}

pub struct MemoryExecutor {
    store: SharedStore,
    working: Option<MemoryStore>,
    savepoint: Option<MemoryStore>,
    dirty: BTreeSet<String>,
    isolation: TransactionIsolation,
    page_cache: HashMap<String, Arc<Vec<SelectedRow>>>,
    stats: ExecStats,
}

impl MemoryExecutor {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            working: None,
            savepoint: None,
            dirty: BTreeSet::new(),
            isolation: TransactionIsolation::None,
            page_cache: HashMap::new(),
            stats: ExecStats::default(),
        }
    }

    pub fn isolation(&self) -> TransactionIsolation {
        self.isolation
    }

    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn with_store<R>(
        &self,
        f: impl FnOnce(&MemoryStore) -> Result<R, DatabaseError>,
    ) -> Result<R, DatabaseError> {
        match &self.working {
            Some(working) => f(working),
            None => {
                let guard = self.store.read().map_err(|_| DatabaseError::Poisoned)?;
                f(&guard)
            }
        }
    }

    fn mutate<R>(
        &mut self,
        table: &str,
        f: impl FnOnce(&mut Vec<JsonMap>) -> Result<R, DatabaseError>,
    ) -> Result<R, DatabaseError> {
        self.page_cache.clear();
        match self.working.as_mut() {
            Some(working) => {
                self.dirty.insert(table.to_string());
                f(working.rows_mut(table)?)
            }
            None => {
                let mut guard = self.store.write().map_err(|_| DatabaseError::Poisoned)?;
                f(guard.rows_mut(table)?)
            }
        }
    }

    fn read(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError> {
        if query.method.is_head(true) {
            let total = self.with_store(|store| select(store, query).map(|rows| rows.len()))?;
            self.stats.executed += 1;
            return Ok(ExecOutcome::row(count_row(total)));
        }

        let key = query.page_key();
        let (page, cached) = match self.page_cache.get(&key) {
            Some(page) => {
                self.stats.cached += 1;
                (Arc::clone(page), true)
            }
            None => {
                let rows = self.with_store(|store| select_page(store, query))?;
                self.stats.executed += 1;
                let page = Arc::new(rows);
                self.page_cache.insert(key, Arc::clone(&page));
                (page, false)
            }
        };

        let selected = page.get(query.position);
        let explain = (query.explain && query.position == 0).then(|| {
            json!({
                "table": query.table_key(),
                "method": query.method.as_str(),
                "conditions": query.conditions.iter().map(|c| c.key.clone()).collect::<Vec<_>>(),
                "joins": query.joins.iter().map(|j| j.path.clone()).collect::<Vec<_>>(),
                "rows": page.len(),
                "cached": cached,
            })
        });
        Ok(ExecOutcome {
            row: selected.map(|s| s.row.clone()),
            page_rows: (query.position == 0).then(|| page.iter().map(|s| s.row.clone()).collect()),
            joined: selected.map(|s| s.joined.clone()).unwrap_or_default(),
            explain,
        })
    }

    fn insert(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError> {
        let mut values = JsonMap::new();
        for condition in &query.conditions {
            values.insert(field_name(&condition.key)?, literal(&condition.key, &condition.value)?);
        }

        let table = query.table.clone();
        let row = self.mutate(&table, |rows| {
            let id = match values.get(keys::KEY_ID) {
                Some(id) if !id.is_null() => id.clone(),
                _ => {
                    let next = rows
                        .iter()
                        .filter_map(|r| r.get(keys::KEY_ID).and_then(Value::as_i64))
                        .max()
                        .unwrap_or(0)
                        + 1;
                    Value::from(next)
                }
            };
            let mut row = JsonMap::new();
            row.insert(keys::KEY_ID.to_string(), id.clone());
            for (k, v) in values {
                row.entry(k).or_insert(v);
            }
            rows.push(row);
            Ok(id)
        })?;
        self.stats.executed += 1;

        let mut summary = count_row(1);
        summary.insert(keys::KEY_ID.to_string(), row);
        Ok(ExecOutcome::row(summary))
    }

    fn update(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError> {
        let mut predicates = vec![];
        let mut assignments = JsonMap::new();
        for condition in &query.conditions {
            let value = literal(&condition.key, &condition.value)?;
            if condition.key == keys::KEY_ID || condition.key == keys::KEY_ID_IN {
                predicates.push(Predicate::new(&condition.key, value)?);
            } else {
                assignments.insert(field_name(&condition.key)?, value);
            }
        }
        if predicates.is_empty() {
            return Err(DatabaseError::InvalidValue {
                key: keys::KEY_ID.to_string(),
                reason: "PUT requires id or id{}".to_string(),
            });
        }

        let table = query.table.clone();
        let updated = self.mutate(&table, |rows| {
            let mut updated = 0;
            for row in rows.iter_mut() {
                if predicates.iter().all(|p| p.matches(row)) {
                    for (k, v) in &assignments {
                        row.insert(k.clone(), v.clone());
                    }
                    updated += 1;
                }
            }
            Ok(updated)
        })?;
        self.stats.executed += 1;
        Ok(ExecOutcome::row(mutation_summary(query, updated)))
    }

    fn delete(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError> {
        let predicates = query
            .conditions
            .iter()
            .map(|c| Predicate::new(&c.key, literal(&c.key, &c.value)?))
            .collect::<Result<Vec<_>, _>>()?;
        if predicates.is_empty() {
            return Err(DatabaseError::InvalidValue {
                key: keys::KEY_ID.to_string(),
                reason: "DELETE requires at least one condition".to_string(),
            });
        }

        let table = query.table.clone();
        let deleted = self.mutate(&table, |rows| {
            let before = rows.len();
            rows.retain(|row| !predicates.iter().all(|p| p.matches(row)));
            Ok(before - rows.len())
        })?;
        self.stats.executed += 1;
        Ok(ExecOutcome::row(mutation_summary(query, deleted)))
    }
}

impl SqlExecutor for MemoryExecutor {
    fn execute(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError> {
        self.stats.generated += 1;
        let started = Instant::now();
        let outcome = match query.method {
            RequestMethod::Get | RequestMethod::Gets | RequestMethod::Head | RequestMethod::Heads => {
                self.read(query)
            }
            RequestMethod::Post => self.insert(query),
            RequestMethod::Put => self.update(query),
            RequestMethod::Delete => self.delete(query),
            RequestMethod::Crud => Err(DatabaseError::UnsupportedMethod(query.method.to_string())),
        };
        self.stats.duration += started.elapsed();
        outcome
    }

    fn begin(&mut self, isolation: TransactionIsolation) -> Result<(), DatabaseError> {
        self.isolation = isolation;
        if isolation == TransactionIsolation::None {
            return Ok(());
        }
        let snapshot = self
            .store
            .read()
            .map_err(|_| DatabaseError::Poisoned)?
            .clone();
        self.savepoint = Some(snapshot.clone());
        self.working = Some(snapshot);
        self.dirty.clear();
        self.page_cache.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if let Some(working) = self.working.take() {
            let mut guard = self.store.write().map_err(|_| DatabaseError::Poisoned)?;
            for table in std::mem::take(&mut self.dirty) {
                match working.tables.get(&table) {
                    Some(rows) => guard.tables.insert(table, rows.clone()),
                    None => guard.tables.remove(&table),
                };
            }
        }
        self.savepoint = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.working = None;
        self.savepoint = None;
        self.dirty.clear();
        self.page_cache.clear();
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, _savepoint: Option<String>) -> Result<(), DatabaseError> {
        if let Some(savepoint) = &self.savepoint {
            self.working = Some(savepoint.clone());
            self.dirty.clear();
        }
        self.page_cache.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.working = None;
        self.savepoint = None;
        self.dirty.clear();
        self.page_cache.clear();
    }

    fn stats(&self) -> ExecStats {
        self.stats
    }
}

fn count_row(count: usize) -> JsonMap {
    let mut row = JsonMap::new();
    row.insert(keys::KEY_COUNT.to_string(), Value::from(count));
    row
}

fn mutation_summary(query: &QueryDescriptor, count: usize) -> JsonMap {
    let mut summary = count_row(count);
    for key in [keys::KEY_ID, keys::KEY_ID_IN] {
        if let Some(ConditionValue::Value(v)) = query.condition(key) {
            summary.insert(key.to_string(), v.clone());
        }
    }
    summary
}

fn field_name(key: &str) -> Result<String, DatabaseError> {
    if is_name(key) {
        Ok(key.to_string())
    } else {
        Err(DatabaseError::UnsupportedCondition(key.to_string()))
    }
}

fn literal(key: &str, value: &ConditionValue) -> Result<Value, DatabaseError> {
    match value {
        ConditionValue::Value(v) => Ok(v.clone()),
        ConditionValue::Subquery(_) => Err(DatabaseError::InvalidValue {
            key: key.to_string(),
            reason: "subquery not allowed here".to_string(),
        }),
    }
}

/// Rows of one page, projected.
fn select_page(store: &MemoryStore, query: &QueryDescriptor) -> Result<Vec<SelectedRow>, DatabaseError> {
    let rows = select(store, query)?;
    Ok(window(rows, query.count, query.page))
}

fn window<T>(rows: Vec<T>, count: usize, page: usize) -> Vec<T> {
    if count == 0 {
        return rows;
    }
    rows.into_iter().skip(count * page).take(count).collect()
}

/// All matching rows, filtered, joined, ordered and projected.
fn select(store: &MemoryStore, query: &QueryDescriptor) -> Result<Vec<SelectedRow>, DatabaseError> {
    let base: Vec<JsonMap> = match &query.from {
        Some(inner) => select_page(store, inner)?.into_iter().map(|s| s.row).collect(),
        None => store.rows(&query.table)?.clone(),
    };

    let predicates = compile(store, query)?;
    let mut rows: Vec<SelectedRow> = base
        .into_iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .map(SelectedRow::plain)
        .collect();

    for join in query.joins.iter().filter(|j| j.join_type.is_sql()) {
        rows = apply_join(store, query, rows, join)?;
    }

    let columns = query
        .columns
        .iter()
        .map(|c| Column::parse(c))
        .collect::<Result<Vec<_>, _>>()?;
    let groups = query
        .group
        .as_deref()
        .map(keys::split_list)
        .unwrap_or_default();

    if groups.is_empty() && !columns.iter().any(Column::is_aggregate) {
        if let Some(order) = &query.order {
            order_rows(&mut rows, order);
        }
        if !columns.is_empty() {
            for selected in rows.iter_mut() {
                selected.row = project(&selected.row, &columns);
            }
        }
        return Ok(rows);
    }

    let mut output = aggregate(rows, &groups, &columns);
    if let Some(having) = &query.having {
        let predicates = having_predicates(having)?;
        output.retain(|s| predicates.iter().all(|p| p.matches(&s.row)));
    }
    if let Some(order) = &query.order {
        order_rows(&mut output, order);
    }
    Ok(output)
}

fn compile(store: &MemoryStore, query: &QueryDescriptor) -> Result<Vec<Predicate>, DatabaseError> {
    query
        .conditions
        .iter()
        .map(|condition| {
            let operand = match &condition.value {
                ConditionValue::Value(v) => v.clone(),
                ConditionValue::Subquery(sub) => {
                    let (_, op) = parse_condition_key(&condition.key)?;
                    let values: Vec<Value> = select_page(store, sub)?
                        .into_iter()
                        .filter_map(|s| s.row.into_iter().next().map(|(_, v)| v))
                        .collect();
                    match op {
                        Operator::In | Operator::NotIn => Value::Array(values),
                        _ => values.into_iter().next().unwrap_or(Value::Null),
                    }
                }
            };
            Predicate::new(&condition.key, operand)
        })
        .collect()
}

fn apply_join(
    store: &MemoryStore,
    query: &QueryDescriptor,
    rows: Vec<SelectedRow>,
    join: &JoinSpec,
) -> Result<Vec<SelectedRow>, DatabaseError> {
    let mut filters = vec![];
    for (k, v) in &join.sub_request {
        if !k.starts_with('@') {
            filters.push(Predicate::new(k, v.clone())?);
        }
    }
    let projection = match join.sub_request.get(keys::KEY_COLUMN).and_then(Value::as_str) {
        Some(spec) => keys::split_list(spec)
            .into_iter()
            .map(Column::parse)
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };
    let candidates: Vec<&JsonMap> = store
        .rows(&join.table)?
        .iter()
        .filter(|r| filters.iter().all(|p| p.matches(r)))
        .collect();

    let main_key = query.table_key();
    let matches_on = |selected: &SelectedRow, candidate: &JsonMap| -> bool {
        join.on.iter().all(|on| {
            let source = if on.target_table_key == main_key {
                selected.row.get(&on.target_key)
            } else {
                selected
                    .joined
                    .get(&on.target_table_key)
                    .and_then(|j| j.get(&on.target_key))
            };
            match (source, candidate.get(&on.key)) {
                (Some(a), Some(b)) if !a.is_null() => values_equal(a, b),
                _ => false,
            }
        })
    };
    let attach = |selected: &SelectedRow, candidate: Option<&JsonMap>| -> SelectedRow {
        let mut next = selected.clone();
        let value = match candidate {
            Some(c) if projection.is_empty() => Value::Object(c.clone()),
            Some(c) => Value::Object(project(c, &projection)),
            None => Value::Null,
        };
        next.joined.insert(join.table_key.clone(), value);
        next
    };

    let mut output = vec![];
    let mut used = vec![false; candidates.len()];
    for selected in &rows {
        let mut matched = false;
        for (i, candidate) in candidates.iter().copied().enumerate() {
            if join.join_type == JoinType::Cross || matches_on(selected, candidate) {
                matched = true;
                used[i] = true;
                output.push(attach(selected, Some(candidate)));
            }
        }
        if !matched && matches!(join.join_type, JoinType::Left | JoinType::Full) {
            output.push(attach(selected, None));
        }
    }
    if matches!(join.join_type, JoinType::Right | JoinType::Full) {
        let empty = SelectedRow::plain(JsonMap::new());
        for (i, candidate) in candidates.iter().copied().enumerate() {
            if !used[i] {
                output.push(attach(&empty, Some(candidate)));
            }
        }
    }
    Ok(output)
}

fn order_rows(rows: &mut [SelectedRow], order: &str) {
    let fields: Vec<(&str, bool)> = keys::split_list(order)
        .into_iter()
        .map(|f| match f.strip_suffix('-') {
            Some(name) => (name, true),
            None => (f.strip_suffix('+').unwrap_or(f), false),
        })
        .collect();
    rows.sort_by(|a, b| {
        let (a, b) = (&a.row, &b.row);
        for (field, desc) in &fields {
            let ordering = sort_order(
                a.get(*field).unwrap_or(&Value::Null),
                b.get(*field).unwrap_or(&Value::Null),
            );
            let ordering = if *desc { ordering.reverse() } else { ordering };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone)]
enum ColumnExpr {
    Field(String),
    Function(Aggregate, Option<String>),
}

/// One `@column` entry: `name`, `name:alias` or `fn(arg)[:alias]`.
#[derive(Debug, Clone)]
struct Column {
    expr: ColumnExpr,
    output: String,
}

impl Column {
    fn parse(spec: &str) -> Result<Self, DatabaseError> {
        let spec = spec.trim();
        let (expr, alias) = match spec.rsplit_once(':') {
            Some((expr, alias)) if is_name(alias) => (expr.trim(), Some(alias)),
            _ => (spec, None),
        };
        let output = alias.unwrap_or(expr).to_string();

        if let Some(caps) = FUNCTION_PATTERN.captures(expr) {
            let function = match caps[1].to_lowercase().as_str() {
                "count" => Aggregate::Count,
                "sum" => Aggregate::Sum,
                "min" => Aggregate::Min,
                "max" => Aggregate::Max,
                "avg" => Aggregate::Avg,
                _ => return Err(DatabaseError::UnsupportedColumn(spec.to_string())),
            };
            let arg = match &caps[2] {
                "*" if function == Aggregate::Count => None,
                "*" => return Err(DatabaseError::UnsupportedColumn(spec.to_string())),
                field => Some(field.to_string()),
            };
            return Ok(Self {
                expr: ColumnExpr::Function(function, arg),
                output,
            });
        }
        if is_name(expr) {
            return Ok(Self {
                expr: ColumnExpr::Field(expr.to_string()),
                output,
            });
        }
        Err(DatabaseError::UnsupportedColumn(spec.to_string()))
    }

    fn is_aggregate(&self) -> bool {
        matches!(self.expr, ColumnExpr::Function(..))
    }
}

fn project(row: &JsonMap, columns: &[Column]) -> JsonMap {
    let mut out = JsonMap::new();
    for column in columns {
        if let ColumnExpr::Field(name) = &column.expr {
            out.insert(
                column.output.clone(),
                row.get(name).cloned().unwrap_or(Value::Null),
            );
        }
    }
    out
}

fn aggregate(rows: Vec<SelectedRow>, groups: &[&str], columns: &[Column]) -> Vec<SelectedRow> {
    let mut order: Vec<String> = vec![];
    let mut buckets: HashMap<String, Vec<SelectedRow>> = HashMap::new();
    for selected in rows {
        let key = groups
            .iter()
            .map(|g| selected.row.get(*g).cloned().unwrap_or(Value::Null))
            .collect::<Vec<_>>();
        let key = Value::Array(key).to_string();
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(selected);
    }
    if groups.is_empty() && order.is_empty() {
        order.push(String::new());
        buckets.insert(String::new(), vec![]);
    }

    order
        .into_iter()
        .filter_map(|key| buckets.remove(&key))
        .map(|bucket| {
            let first = bucket.first().cloned();
            let mut out = JsonMap::new();
            if columns.is_empty() {
                if let Some(first) = &first {
                    out = first.row.clone();
                }
            }
            for column in columns {
                let value = match &column.expr {
                    ColumnExpr::Field(name) => first
                        .as_ref()
                        .and_then(|f| f.row.get(name).cloned())
                        .unwrap_or(Value::Null),
                    ColumnExpr::Function(function, arg) => fold(*function, arg.as_deref(), &bucket),
                };
                out.insert(column.output.clone(), value);
            }
            SelectedRow {
                row: out,
                joined: first.map(|f| f.joined).unwrap_or_default(),
            }
        })
        .collect()
}

fn fold(function: Aggregate, field: Option<&str>, rows: &[SelectedRow]) -> Value {
    let values: Vec<&Value> = match field {
        Some(f) => rows
            .iter()
            .filter_map(|r| r.row.get(f))
            .filter(|v| !v.is_null())
            .collect(),
        None => return Value::from(rows.len()),
    };
    match function {
        Aggregate::Count => Value::from(values.len()),
        Aggregate::Sum | Aggregate::Avg => {
            let numbers: Vec<&serde_json::Number> =
                values.iter().filter_map(|v| v.as_number()).collect();
            if function == Aggregate::Sum && numbers.iter().all(|n| n.is_i64()) {
                return Value::from(numbers.iter().filter_map(|n| n.as_i64()).sum::<i64>());
            }
            let sum: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            if function == Aggregate::Avg {
                if numbers.is_empty() {
                    return Value::Null;
                }
                return json!(sum / numbers.len() as f64);
            }
            json!(sum)
        }
        Aggregate::Min => values
            .into_iter()
            .min_by(|a, b| sort_order(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Aggregate::Max => values
            .into_iter()
            .max_by(|a, b| sort_order(a, b))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// `@having: "n>1,total<=10"` against aggregated output columns.
fn having_predicates(having: &str) -> Result<Vec<Predicate>, DatabaseError> {
    keys::split_list(having)
        .into_iter()
        .map(|clause| {
            let caps = HAVING_PATTERN
                .captures(clause)
                .ok_or_else(|| DatabaseError::UnsupportedCondition(clause.to_string()))?;
            let suffix = match &caps[2] {
                "=" => "",
                "!=" => "!",
                other => other,
            };
            let raw = caps[3].trim();
            let operand: Value = serde_json::from_str(raw)
                .unwrap_or_else(|_| Value::String(raw.trim_matches('\'').to_string()));
            Predicate::new(&format!("{}{}", &caps[1], suffix), operand)
        })
        .collect()
}
