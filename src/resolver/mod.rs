//! Resolution of request trees into response trees.
//!
//! [`RequestParser::parse`] is the entry point: it verifies the request,
//! brackets mutations in a transaction and walks the tree depth-first in
//! document order, one [`ResolveCtx`] per request.

pub mod app_join;
pub mod array_resolver;
pub mod context;
pub mod depth_guard;
pub mod directives;
pub mod errors;
pub mod join_parser;
pub mod method_selector;
pub mod object_resolver;
pub mod operation;
pub mod pagination;
pub mod path_index;
pub mod response;
pub mod transaction;

use chrono::Utc;

pub use context::{Branch, Globals, ResolveCtx};
pub use errors::ResolveError;
pub use path_index::{Lookup, PathIndex, ReferencePolicy};
pub use transaction::{RollbackReport, TransactionController};

use crate::config::ResolverConfig;
use crate::executor::SqlExecutor;
use crate::request::keys::{
    KEY_CACHE, KEY_CATALOG, KEY_DATABASE, KEY_DATASOURCE, KEY_EXPLAIN, KEY_FORMAT, KEY_NAMESPACE,
    KEY_ROLE, KEY_SCHEMA, KEY_TAG, KEY_VERSION,
};
use crate::request::{get_bool, get_int, get_string, JsonMap, RequestMethod};
use crate::verifier::{StructureSource, Verifier, ROLE_UNKNOWN};
use response::DebugInfo;

/// Keys read once at the root and removed before resolution.
const ROOT_RESERVED_KEYS: [&str; 11] = [
    KEY_FORMAT,
    KEY_VERSION,
    KEY_TAG,
    KEY_ROLE,
    KEY_DATABASE,
    KEY_DATASOURCE,
    KEY_NAMESPACE,
    KEY_CATALOG,
    KEY_SCHEMA,
    KEY_EXPLAIN,
    KEY_CACHE,
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    /// Success or error envelope.
    pub response: JsonMap,
    pub error: Option<ResolveError>,
    pub rollback: Option<RollbackReport>,
}

impl ParseOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct Prepared {
    /// Resolution root, without the root directives.
    root: JsonMap,
    /// Verified request, read when a reference points past what is resolved.
    corrected: JsonMap,
    globals: Globals,
    format: bool,
}

struct Resolved {
    body: JsonMap,
    warn: Option<String>,
    depth: usize,
}

pub struct RequestParser<'a> {
    config: &'a ResolverConfig,
    verifier: &'a dyn Verifier,
    structures: &'a dyn StructureSource,
}

impl<'a> RequestParser<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        verifier: &'a dyn Verifier,
        structures: &'a dyn StructureSource,
    ) -> Self {
        Self {
            config,
            verifier,
            structures,
        }
    }

    /// Resolves `request` under `method`. Never fails: errors come back as
    /// an error envelope with `error` set.
    pub fn parse(
        &self,
        method: RequestMethod,
        request: &JsonMap,
        executor: &mut dyn SqlExecutor,
    ) -> ParseOutcome {
        let start = Utc::now();
        log::info!("{} request with {} top-level key(s)", method, request.len());

        let (result, rollback) = match self.prepare(method, request) {
            Ok(Prepared {
                root,
                corrected,
                globals,
                format,
            }) => {
                let outcome = TransactionController::run(method, executor, |executor| {
                    self.resolve(method, root, corrected, globals, executor)
                });
                (outcome.result.map(|r| (r, format)), outcome.rollback)
            }
            Err(e) => (Err(e), None),
        };
        let stats = executor.stats();
        executor.close();

        match result {
            Ok((resolved, format)) => {
                let body = if format {
                    response::format_keys(resolved.body)
                } else {
                    resolved.body
                };
                let mut body = response::success(body, resolved.warn);
                if self.config.debug {
                    let end = Utc::now();
                    let sql_ms = stats.duration.as_millis() as i64;
                    DebugInfo {
                        start,
                        end,
                        parse_ms: ((end - start).num_milliseconds() - sql_ms).max(0),
                        stats,
                        max_sql_count: self.config.max_sql_count,
                        depth: resolved.depth,
                        max_depth: self.config.max_query_depth,
                    }
                    .apply(&mut body);
                }
                log::info!("{} request resolved, {} statement(s) executed", method, stats.executed);
                ParseOutcome {
                    response: body,
                    error: None,
                    rollback,
                }
            }
            Err(e) => {
                log::warn!("{} request failed with {} ({}): {}", method, e.kind(), e.code(), e);
                ParseOutcome {
                    response: response::error(&e),
                    error: Some(e),
                    rollback,
                }
            }
        }
    }

    /// Verification and root directive extraction, before any statement
    /// runs.
    fn prepare(&self, method: RequestMethod, request: &JsonMap) -> Result<Prepared, ResolveError> {
        let format = get_bool(request, KEY_FORMAT)?.unwrap_or(false);
        let tag = get_string(request, KEY_TAG)?;
        let version = get_int(request, KEY_VERSION)?.unwrap_or(0);

        let corrected = if method.is_public() {
            request.clone()
        } else {
            method_selector::batch_verify(
                method,
                tag.as_deref(),
                version,
                request,
                self.config,
                self.structures,
                self.verifier,
            )?
        };

        let mut globals = Globals::from_root(&corrected)?;
        if self.config.verify_role && globals.role.is_none() {
            globals.role = Some(ROLE_UNKNOWN.to_string());
        }
        let root = corrected
            .iter()
            .filter(|(k, _)| !ROOT_RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Prepared {
            root,
            corrected,
            globals,
            format,
        })
    }

    fn resolve(
        &self,
        method: RequestMethod,
        root: JsonMap,
        corrected: JsonMap,
        globals: Globals,
        executor: &mut dyn SqlExecutor,
    ) -> Result<Resolved, ResolveError> {
        let mut ctx = ResolveCtx::new(self.config, executor, self.verifier, corrected, globals);
        let branch = Branch::new(if method == RequestMethod::Crud {
            RequestMethod::Get
        } else {
            method
        });
        let body = object_resolver::resolve_object(&mut ctx, Some(&root), "", "", None, &branch, false)?
            .unwrap_or_default();
        Ok(Resolved {
            body,
            warn: ctx.warning_text(),
            depth: ctx.depth.deepest(),
        })
    }
}
