//! Error types for the catalog crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort loading or pruning a catalog
///
/// Problems found while validating a loaded catalog are not errors; they are
/// collected in a [`ValidationReport`](crate::ValidationReport) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A definition (or the document holding it) has the wrong shape
    #[error("invalid resource definition {resource}: {message}")]
    Parse { resource: String, message: String },

    /// Malformed JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or write a definitions file
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key that is not in the catalog
    #[error("resource '{0}' not found in catalog")]
    UnknownResource(String),
}

impl Error {
    pub(crate) fn parse(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;
