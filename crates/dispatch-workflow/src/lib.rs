//! Durable Step Runtime — resumable workflow instances whose bodies are
//! plain async functions calling out through a [`Step`] handle. Replay
//! after a restart re-enters the body from the top; already-completed
//! `step.do` calls short-circuit to their persisted result instead of
//! re-running, which is what makes that safe.

mod error;
mod instance;
mod runtime;
mod schema;
mod step;

pub use error::{Result, WorkflowError};
pub use instance::{ResumableInstance, WorkflowStatus};
pub use runtime::{run_workflow, WorkflowRuntime};
pub use step::Step;
