//! Engine error types
//!
//! User-facing type errors are never reported through this type: they are
//! accumulated as [`crate::diagnostic::Diagnostic`]s by the site that found
//! them. `EngineError` covers internal invariant violations and failures of
//! the external collaborators, and aborts the operation in progress.

use thiserror::Error;

use crate::graph::SiteId;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A structural dependency was recorded by a site but its reverse index
    /// no longer lists that site
    #[error("site {site} is missing from the reverse index of {entity}")]
    MissingReverseIndex { site: SiteId, entity: String },

    /// A method body declared a parameter without a vertex for it
    #[error("malformed formal arguments for `{method}`: no vertex for parameter `{param}`")]
    MalformedFormals { method: String, param: String },

    /// Vertices or sites of a replaced document are still owned by a live one
    #[error("dangling reuse after updating `{path}`: {vertices} vertices and {sites} sites shared with the replaced tree")]
    DanglingReuse { path: String, vertices: usize, sites: usize },

    /// The configured fuel for a single drain ran out
    #[error("fixpoint did not converge within {runs} site runs")]
    FuelExhausted { runs: usize },

    /// The frontend could not produce a tree for a document
    #[error("failed to parse `{path}`: {message}")]
    Parse { path: String, message: String },

    #[error("unknown document `{0}`")]
    UnknownDocument(String),
}
