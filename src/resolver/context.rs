//! Per-request resolution state.

use std::collections::HashMap;

use serde_json::Value;

use super::depth_guard::DepthGuard;
use super::directives::PageWindow;
use super::errors::ResolveError;
use super::join_parser::JoinSpec;
use super::operation::NodeOperation;
use super::path_index::{Lookup, PathIndex, ReferenceLookup};
use crate::config::ResolverConfig;
use crate::executor::{ExecOutcome, QueryDescriptor, SqlExecutor};
use crate::request::keys::{
    KEY_CACHE, KEY_CATALOG, KEY_DATABASE, KEY_DATASOURCE, KEY_EXPLAIN, KEY_NAMESPACE, KEY_ROLE,
    KEY_SCHEMA,
};
use crate::request::{get_bool, get_string, FieldTypeError, JsonMap, QueryMode, RequestMethod};
use crate::verifier::Verifier;

/// Root-level directives applied to every table of the request unless a
/// node overrides them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Globals {
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub datasource: Option<String>,
    pub namespace: Option<String>,
    pub catalog: Option<String>,
    pub cache: Option<String>,
    pub explain: bool,
}

impl Globals {
    pub fn from_root(root: &JsonMap) -> Result<Self, FieldTypeError> {
        Ok(Self {
            role: get_string(root, KEY_ROLE)?,
            database: get_string(root, KEY_DATABASE)?,
            schema: get_string(root, KEY_SCHEMA)?,
            datasource: get_string(root, KEY_DATASOURCE)?,
            namespace: get_string(root, KEY_NAMESPACE)?,
            catalog: get_string(root, KEY_CATALOG)?,
            cache: get_string(root, KEY_CACHE)?,
            explain: get_bool(root, KEY_EXPLAIN)?.unwrap_or(false),
        })
    }
}

/// Rows fetched on behalf of a node by a join of its array's main table.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinedRows {
    One(Option<JsonMap>),
    Many(Vec<JsonMap>),
}

/// Method and role a branch of the request resolves under.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub method: RequestMethod,
    pub role: Option<String>,
}

impl Branch {
    pub fn new(method: RequestMethod) -> Self {
        Self { method, role: None }
    }
}

/// What a direct child of an array item knows about its array.
#[derive(Debug, Clone)]
pub struct ArrayScope {
    /// Path of the array node.
    pub path: String,
    pub method: RequestMethod,
    pub query: QueryMode,
    pub compat: bool,
    pub window: PageWindow,
    pub position: usize,
    /// First table key of the item.
    pub main_key: Option<String>,
    pub sql_joins: Vec<JoinSpec>,
    pub app_joins: Vec<JoinSpec>,
}

impl ArrayScope {
    pub fn is_main(&self, name: &str) -> bool {
        self.main_key.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub path: String,
    pub message: String,
}

pub struct ResolveCtx<'a> {
    pub config: &'a ResolverConfig,
    pub executor: &'a mut dyn SqlExecutor,
    pub verifier: &'a dyn Verifier,
    /// Verified request tree, for reference fallback.
    pub root: JsonMap,
    pub globals: Globals,
    pub index: PathIndex,
    pub depth: DepthGuard,
    pub main_cache: HashMap<String, NodeOperation>,
    pub join_rows: HashMap<String, JoinedRows>,
    /// Array path -> raw rows of its main table's page.
    pub raw_rows: HashMap<String, Vec<JsonMap>>,
    /// Descriptor left by the main table of a subquery being resolved.
    pub subquery: Option<QueryDescriptor>,
    pub warnings: Vec<Warning>,
}

impl<'a> ResolveCtx<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        executor: &'a mut dyn SqlExecutor,
        verifier: &'a dyn Verifier,
        root: JsonMap,
        globals: Globals,
    ) -> Self {
        Self {
            config,
            executor,
            verifier,
            root,
            globals,
            index: PathIndex::new(),
            depth: DepthGuard::new(config.max_query_depth),
            main_cache: HashMap::new(),
            join_rows: HashMap::new(),
            raw_rows: HashMap::new(),
            subquery: None,
            warnings: vec![],
        }
    }

    /// Executes one statement and enforces the per-request statement
    /// ceiling.
    pub fn execute(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, ResolveError> {
        log::debug!(
            "execute {} {} count={} page={} position={}",
            query.method,
            query.table_key(),
            query.count,
            query.page,
            query.position
        );
        let outcome = self
            .executor
            .execute(query)
            .map_err(|e| ResolveError::database(query, e))?;
        let executed = self.executor.stats().executed;
        if executed > self.config.max_sql_count {
            return Err(ResolveError::ResourceExhausted(format!(
                "{} statements executed, which exceeds the limit of {}",
                executed, self.config.max_sql_count
            )));
        }
        Ok(outcome)
    }

    pub fn record(&mut self, path: &str, value: Value) {
        self.index.record(path, value);
    }

    pub fn warn(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", path, message);
        self.warnings.push(Warning {
            path: path.to_string(),
            message,
        });
    }

    /// Warnings joined into the `warn` field of a response.
    pub fn warning_text(&self) -> Option<String> {
        if self.warnings.is_empty() {
            return None;
        }
        Some(
            self.warnings
                .iter()
                .map(|w| format!("{}: {}", w.path, w.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl ReferenceLookup for ResolveCtx<'_> {
    fn lookup_reference(&self, path: &str) -> Lookup {
        self.index.lookup(path, &self.root)
    }
}
