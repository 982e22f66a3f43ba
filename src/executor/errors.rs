//! Errors raised by a [`super::SqlExecutor`].

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DatabaseError {
    #[error("Table `{0}` does not exist")]
    UnknownTable(String),

    #[error("Unsupported column expression `{0}`")]
    UnsupportedColumn(String),

    #[error("Unsupported condition `{0}`")]
    UnsupportedCondition(String),

    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Unsupported statement method {0}")]
    UnsupportedMethod(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Backend(String),
}
