//! Error type for the Assignment Orchestrator, Development Workflow and
//! Reconciliation Workflow.

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] dispatch_store::StoreError),
    #[error(transparent)]
    Sync(#[from] dispatch_sync::SyncError),
    #[error(transparent)]
    Workflow(#[from] dispatch_workflow::WorkflowError),
    #[error("development workflow review rejected: {0}")]
    ReviewRejected(String),
    #[error("development workflow timed out waiting for PR approval")]
    ApprovalTimeout,
    #[error("agent backend operation failed: {0}")]
    Backend(String),
}

impl From<OrchestratorError> for dispatch_core::CoreError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Store(e) => e.into(),
            other => dispatch_core::CoreError::storage(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for dispatch_workflow::WorkflowError {
    fn from(err: OrchestratorError) -> Self {
        dispatch_workflow::WorkflowError::StepFailed(err.to_string())
    }
}
