use thiserror::Error;

use crate::executor::descriptor::QueryDescriptor;
use crate::executor::errors::DatabaseError;
use crate::request::FieldTypeError;
use crate::verifier::VerifyError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("{0}")]
    Structure(String),

    #[error("{0}")]
    Access(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Reference {reference} at {path} resolved to null")]
    Reference { path: String, reference: String },

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("Database error on {target}: {source}")]
    Database {
        target: String,
        query: Option<Box<QueryDescriptor>>,
        source: DatabaseError,
    },
}

impl ResolveError {
    pub fn structure(msg: impl Into<String>) -> Self {
        ResolveError::Structure(msg.into())
    }

    pub fn database(query: &QueryDescriptor, source: DatabaseError) -> Self {
        ResolveError::Database {
            target: query.table_key(),
            query: Some(Box::new(query.clone())),
            source,
        }
    }

    /// Status code carried in an error response.
    pub fn code(&self) -> u16 {
        match self {
            ResolveError::Structure(_) | ResolveError::Reference { .. } => 400,
            ResolveError::Access(_) => 401,
            ResolveError::Forbidden(_) => 403,
            ResolveError::Conflict(_) => 409,
            ResolveError::ResourceExhausted(_) => 429,
            ResolveError::Database { .. } => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Structure(_) => "Structure",
            ResolveError::Access(_) => "Access",
            ResolveError::Forbidden(_) => "Forbidden",
            ResolveError::Conflict(_) => "Conflict",
            ResolveError::Reference { .. } => "Reference",
            ResolveError::ResourceExhausted(_) => "ResourceExhausted",
            ResolveError::Database { .. } => "Database",
        }
    }
}

impl From<FieldTypeError> for ResolveError {
    fn from(e: FieldTypeError) -> Self {
        ResolveError::Structure(e.to_string())
    }
}

impl From<VerifyError> for ResolveError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Access(msg) => ResolveError::Access(msg),
            VerifyError::Forbidden(msg) => ResolveError::Forbidden(msg),
            VerifyError::Conflict(msg) => ResolveError::Conflict(msg),
            VerifyError::Invalid(msg) => ResolveError::Structure(msg),
        }
    }
}
