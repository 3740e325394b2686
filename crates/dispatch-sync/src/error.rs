//! Error type for the Sync Engine and remote tracker plumbing.

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote tracker request failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("remote tracker returned {status}: {message}")]
    RemoteStatus { status: u16, message: String },
    #[error(transparent)]
    Store(#[from] dispatch_store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("missing webhook header: {0}")]
    MissingHeader(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("no installation token available for installation {0}")]
    NoToken(i64),
}

impl From<SyncError> for dispatch_core::CoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(e) => e.into(),
            other => dispatch_core::CoreError::validation(other.to_string()),
        }
    }
}
