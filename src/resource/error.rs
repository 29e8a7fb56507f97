use std::path::PathBuf;

use crate::identifier::Identifier;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Malformed identifier '{input}': {reason}")]
    MalformedIdentifier { input: String, reason: String },

    #[error("Invalid namespace '{namespace}': only [a-z0-9_] are allowed")]
    InvalidNamespace { namespace: String },

    #[error("A provider for namespace '{namespace}' is already registered")]
    DuplicateNamespace { namespace: String },

    #[error("No provider registered for namespace '{namespace}'")]
    UnknownNamespace { namespace: String },

    #[error("Resource not found: {identifier} ({reason})")]
    NotFound {
        identifier: Identifier,
        reason: &'static str,
    },

    #[error("Unsupported resource layout at {path}: only single-file archives can back a namespace")]
    UnsupportedLayout { path: PathBuf },

    #[error("Failed to open archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
