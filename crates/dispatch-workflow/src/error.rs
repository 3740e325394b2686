//! Durable Step Runtime error type.

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// `step.do` called twice with the same name in one body execution.
    #[error("duplicate step name {0:?} in one workflow instance")]
    DuplicateStep(String),

    /// `step.wait_for_event` timed out before the event arrived.
    #[error("timed out waiting for event {event:?} after {waited_secs}s")]
    EventTimeout { event: String, waited_secs: u64 },

    /// The instance was terminated while running or paused.
    #[error("workflow instance terminated")]
    Terminated,

    /// A step's body failed; carries whatever the body reported.
    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<dispatch_core::CoreError> for WorkflowError {
    fn from(e: dispatch_core::CoreError) -> Self {
        Self::StepFailed(e.to_string())
    }
}

impl From<WorkflowError> for dispatch_core::CoreError {
    fn from(e: WorkflowError) -> Self {
        dispatch_core::CoreError::storage(e.to_string())
    }
}
