//! Sync Engine — webhook ingest, push/pull/sync against a remote issue
//! tracker, and the conflict resolution policy between them. The only
//! remote tracker wired up is GitHub; [`RemoteTracker`] is the seam a
//! different one would plug into.

mod engine;
mod error;
mod github_tracker;
mod pr_tracker;
mod token_cache;
mod tracker;
pub mod webhook;

pub use engine::{process_webhook, pull, push, sync, Conflict, SyncIssueError, SyncResult};
pub use error::{Result, SyncError};
pub use github_tracker::GithubTracker;
pub use pr_tracker::{PrTracker, PullRequestRef};
pub use token_cache::{NoTokenProvider, TokenCache, TokenProvider};
pub use tracker::{RemoteIssue, RemoteIssueRef, RemoteTracker};
pub use webhook::{parse_event, verify_signature, WebhookEvent};
