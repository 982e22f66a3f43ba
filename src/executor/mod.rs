//! Statement execution behind the [`SqlExecutor`] trait.
//!
//! The resolver hands one [`QueryDescriptor`] at a time to the executor and
//! never sees SQL text. [`memory::MemoryExecutor`] is the in-process
//! implementation used by the server and the test suites.

pub mod descriptor;
pub mod errors;
pub mod filter;
pub mod memory;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use descriptor::{Condition, ConditionValue, QueryDescriptor};
pub use errors::DatabaseError;
pub use memory::{MemoryExecutor, MemoryStore, SharedStore};

use crate::request::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionIsolation {
    #[default]
    None,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    /// Row at the requested position, or the `{count, id}` summary of a
    /// mutation.
    pub row: Option<JsonMap>,
    /// All rows of the page; only filled for position 0 reads.
    pub page_rows: Option<Vec<JsonMap>>,
    /// Joined table key -> joined row (or null) for the row at `position`.
    pub joined: JsonMap,
    pub explain: Option<Value>,
}

impl ExecOutcome {
    pub fn row(row: JsonMap) -> Self {
        Self {
            row: Some(row),
            ..Default::default()
        }
    }
}

/// Counters reported in debug responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub generated: usize,
    pub cached: usize,
    pub executed: usize,
    pub duration: Duration,
}

#[cfg_attr(test, mockall::automock)]
pub trait SqlExecutor {
    fn execute(&mut self, query: &QueryDescriptor) -> Result<ExecOutcome, DatabaseError>;

    fn begin(&mut self, isolation: TransactionIsolation) -> Result<(), DatabaseError>;

    fn commit(&mut self) -> Result<(), DatabaseError>;

    fn rollback(&mut self) -> Result<(), DatabaseError>;

    /// `None` rolls back to the implicit savepoint taken at `begin`.
    fn rollback_to_savepoint(&mut self, savepoint: Option<String>) -> Result<(), DatabaseError>;

    fn close(&mut self);

    fn stats(&self) -> ExecStats;
}
