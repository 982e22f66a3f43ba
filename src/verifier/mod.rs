//! Content and access verification collaborators.
//!
//! [`Verifier::verify_request`] checks the content of a non-public request
//! against a template fetched from a [`StructureSource`];
//! [`Verifier::verify_access`] checks one query against the caller's role.

pub mod structure;
pub mod template;

use thiserror::Error;

pub use structure::{StaticStructures, StructureEntry, StructureLoadError, StructureSource};
pub use template::TemplateVerifier;

use crate::executor::QueryDescriptor;
use crate::request::{JsonMap, RequestMethod};

/// Role assumed when a request names none.
pub const ROLE_UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    /// Caller is not identified.
    #[error("{0}")]
    Access(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// Request content does not satisfy its template.
    #[error("{0}")]
    Invalid(String),
}

pub trait Verifier: Send + Sync {
    /// Returns the verified part of `request`. `name` is the single key
    /// under verification, or empty for the whole request.
    #[allow(clippy::too_many_arguments)]
    fn verify_request(
        &self,
        method: RequestMethod,
        name: &str,
        template: &JsonMap,
        request: &JsonMap,
        max_update_count: usize,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> Result<JsonMap, VerifyError>;

    fn verify_access(&self, query: &QueryDescriptor) -> Result<(), VerifyError>;
}

/// Accepts everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveVerifier;

impl Verifier for PermissiveVerifier {
    fn verify_request(
        &self,
        _method: RequestMethod,
        _name: &str,
        _template: &JsonMap,
        request: &JsonMap,
        _max_update_count: usize,
        _database: Option<&str>,
        _schema: Option<&str>,
    ) -> Result<JsonMap, VerifyError> {
        Ok(request.clone())
    }

    fn verify_access(&self, _query: &QueryDescriptor) -> Result<(), VerifyError> {
        Ok(())
    }
}
