//! Transaction bracketing of one top-level request.

use super::errors::ResolveError;
use crate::executor::{DatabaseError, SqlExecutor, TransactionIsolation};
use crate::request::RequestMethod;

/// Failures met while rolling back. Neither is raised to the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub primary: Option<DatabaseError>,
    /// Failure of the fallback rollback to the implicit savepoint.
    pub secondary: Option<DatabaseError>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }
}

#[derive(Debug)]
pub struct TxOutcome<T> {
    pub result: Result<T, ResolveError>,
    /// Set when the rollback path ran.
    pub rollback: Option<RollbackReport>,
}

pub struct TransactionController;

impl TransactionController {
    pub fn isolation_for(method: RequestMethod) -> TransactionIsolation {
        if method.is_query() {
            TransactionIsolation::None
        } else {
            TransactionIsolation::RepeatableRead
        }
    }

    /// Runs `body` inside a transaction when `method` mutates: commit on
    /// success, roll back on failure or on a failed commit.
    pub fn run<T>(
        method: RequestMethod,
        executor: &mut dyn SqlExecutor,
        body: impl FnOnce(&mut dyn SqlExecutor) -> Result<T, ResolveError>,
    ) -> TxOutcome<T> {
        let isolation = Self::isolation_for(method);
        if isolation == TransactionIsolation::None {
            return TxOutcome {
                result: body(executor),
                rollback: None,
            };
        }

        if let Err(e) = executor.begin(isolation) {
            log::error!("{} could not begin a transaction: {}", method, e);
            return TxOutcome {
                result: Err(ResolveError::Database {
                    target: method.to_string(),
                    query: None,
                    source: e,
                }),
                rollback: None,
            };
        }
        log::info!("{} transaction begun with {:?}", method, isolation);

        let result = body(&mut *executor).and_then(|value| match executor.commit() {
            Ok(()) => {
                log::info!("{} transaction committed", method);
                Ok(value)
            }
            Err(e) => Err(ResolveError::Database {
                target: method.to_string(),
                query: None,
                source: e,
            }),
        });

        match result {
            Ok(value) => TxOutcome {
                result: Ok(value),
                rollback: None,
            },
            Err(e) => {
                log::info!("{} failed, rolling back: {}", method, e);
                TxOutcome {
                    result: Err(e),
                    rollback: Some(Self::rollback(executor)),
                }
            }
        }
    }

    pub fn rollback(executor: &mut dyn SqlExecutor) -> RollbackReport {
        let mut report = RollbackReport::default();
        if let Err(e) = executor.rollback() {
            log::error!("rollback failed: {}", e);
            report.primary = Some(e);
            if let Err(e) = executor.rollback_to_savepoint(None) {
                log::error!("rollback to the savepoint failed: {}", e);
                report.secondary = Some(e);
            }
        }
        report
    }
}
