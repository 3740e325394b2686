//! Shared data model, error types and configuration for the Dispatch
//! issue-orchestration platform.
//!
//! `dispatch-core` sits below every other crate in the workspace: it owns
//! the `Issue`/`Dependency`/`Mapping`/`RepoConfig` types that the Issue
//! Store persists, the handful of error variants common to more than one
//! component, and the layered configuration surface described in the
//! specification's external-interfaces section.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::*;
