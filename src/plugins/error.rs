use std::path::PathBuf;

use uuid::Uuid;

use crate::resource::ResourceError;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Bundle descriptor not found in {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("Invalid bundle descriptor in {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Load set cannot be resolved: {reason}")]
    LoadSetUnresolvable { reason: String },

    #[error("Duplicate plugin id {id}: provided by '{first}' and '{second}'")]
    DuplicateIdentity {
        id: Uuid,
        first: String,
        second: String,
    },

    #[error("Plugin loader already initialized")]
    AlreadyInitialized,

    #[error("Plugin initialization must not run inside an async runtime; use spawn_blocking")]
    AsyncContext,

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    pub(crate) fn unresolvable(reason: impl Into<String>) -> Self {
        Self::LoadSetUnresolvable {
            reason: reason.into(),
        }
    }
}
