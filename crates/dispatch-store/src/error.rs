//! Issue Store error type.

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    #[error("dependency cycle rejected: {from} -> {to} would close a cycle")]
    CycleRejected { from: String, to: String },

    #[error("mapping conflict: {message}")]
    MappingConflict { message: String },

    #[error("concurrent update conflict on {resource} {id}")]
    Concurrency { resource: String, id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for dispatch_core::CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { resource, id } => dispatch_core::CoreError::NotFound { resource, id },
            StoreError::CycleRejected { from, to } => dispatch_core::CoreError::CycleRejected { from, to },
            StoreError::MappingConflict { message } => dispatch_core::CoreError::MappingConflict { message },
            other => dispatch_core::CoreError::Storage(other.to_string()),
        }
    }
}
