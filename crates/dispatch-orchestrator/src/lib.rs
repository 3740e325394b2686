//! Assignment Orchestrator, Development Workflow and Reconciliation
//! Workflow: the pieces of the platform that turn a ready, unassigned
//! issue into a merged pull request, and keep local state in step with
//! the remote tracker.

mod assignment;
mod development;
mod error;
mod reconciliation;

pub use assignment::{Assignment, AssignmentOrchestrator, DevelopmentTrigger, WorkflowDispatcher};
pub use development::{
    start_development_workflow, AgentExecutionBackend, AgentReviewBackend, DevelopmentDeps,
    DevelopmentOutcome, ExecuteInput, ExecuteOutput, ReviewOutput, WorkflowTracker,
};
pub use error::{OrchestratorError, Result};
pub use reconciliation::{
    run_reconciliation_workflow, ReconciliationDeps, ReconciliationOutcome, ReconciliationParams, ReconciliationReport,
};
