//! Error variants shared across more than one component.
//!
//! Component-specific failures (a rejected dependency cycle, a mapping
//! conflict, a not-found lookup) are defined once here because both the
//! Issue Store and the DAG Engine / Sync Engine need to construct and
//! match on them. Everything else gets its own error enum in its own
//! crate and converts into this one with `#[from]` where it composes.

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors shared across Dispatch components.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested entity does not exist.
    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    /// Inserting a `blocks` edge would create a cycle in the dependency
    /// graph.
    #[error("dependency cycle rejected: {from} -> {to} would close a cycle")]
    CycleRejected { from: String, to: String },

    /// A mapping would bind a local id or remote number that is already
    /// bound to a different counterpart.
    #[error("mapping conflict: {message}")]
    MappingConflict { message: String },

    /// Caller-supplied input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying storage error, opaque at this layer.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
