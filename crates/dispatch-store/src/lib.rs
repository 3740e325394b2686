//! Issue Store — CRUD on issues and dependency edges, mapping lookups,
//! per-repo sync state, and the webhook delivery dedup set.
//!
//! The Issue Store is the only shared mutable state in the system
//! (spec.md §5): it exclusively owns issues, dependencies and mappings,
//! and also carries the dedup set and repo table as "part of that store"
//! per the same section. Backed by `sqlx` against SQLite, the same
//! runtime-checked-query style `claude_sdk_rs`'s `SqliteStorage` uses in
//! this workspace, rather than compile-time-checked `query!` macros
//! (which would need a live `DATABASE_URL` at build time).

mod error;
mod filter;
mod schema;
mod sqlite_store;

pub use error::{Result, StoreError};
pub use filter::IssueFilter;
pub use sqlite_store::SqliteIssueStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{DependencyEdge, Issue, IssueId, Mapping, RepoConfig};
use dispatch_dag::DagSnapshot;

/// One recorded failure from processing a webhook delivery, surfaced
/// through the status endpoint (spec.md §7 — "observable through a
/// separate status endpoint").
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookErrorRecord {
    pub delivery_id: String,
    pub event_kind: String,
    pub action: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Storage contract the rest of the system programs against. The only
/// implementation shipped is [`SqliteIssueStore`]; the trait exists so
/// tests and alternative deployments can substitute an in-memory or
/// different relational backend without touching callers.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn create_issue(&self, issue: Issue) -> Result<Issue>;
    async fn get_issue(&self, id: &IssueId) -> Result<Issue>;
    /// Full replace of the mutable fields of an existing issue. Bumps
    /// `updated_at` to now.
    async fn update_issue(&self, issue: Issue) -> Result<Issue>;
    /// Sets `status = closed`, `closed_at = now`. Permitted even if open
    /// `blocks`-children exist (logged, not rejected).
    async fn close_issue(&self, id: &IssueId) -> Result<Issue>;
    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Inserts a dependency edge, rejecting it with
    /// [`StoreError::CycleRejected`] if it is a `blocks`-edge that would
    /// close a cycle.
    async fn add_dependency(&self, edge: DependencyEdge) -> Result<()>;
    async fn remove_dependency(&self, edge: &DependencyEdge) -> Result<()>;
    async fn list_dependencies(&self) -> Result<Vec<DependencyEdge>>;

    /// A consistent snapshot of all issues and edges, for the DAG Engine.
    async fn dag_snapshot(&self) -> Result<DagSnapshot>;

    async fn upsert_mapping(&self, mapping: Mapping) -> Result<()>;
    async fn get_mapping_by_local(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        local_id: &IssueId,
    ) -> Result<Option<Mapping>>;
    async fn get_mapping_by_remote(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        remote_number: u64,
    ) -> Result<Option<Mapping>>;
    async fn list_mappings(&self, owner: &str, repo: &str, installation_id: i64) -> Result<Vec<Mapping>>;

    async fn list_repos(&self, sync_enabled_only: bool) -> Result<Vec<RepoConfig>>;
    async fn upsert_repo(&self, repo: RepoConfig) -> Result<()>;

    /// Checks whether `delivery_id` has already been recorded as
    /// successfully processed, without side effects.
    async fn has_seen_webhook(&self, delivery_id: &str) -> Result<bool>;
    /// Records `delivery_id` as seen. Callers mark a delivery seen only
    /// once it has been fully processed, so a delivery that failed
    /// partway is not dedup-dropped on redelivery.
    async fn mark_webhook_seen(&self, delivery_id: &str) -> Result<()>;
    /// Persists one processing failure for `delivery_id`, queryable
    /// through the status endpoint.
    async fn record_webhook_error(&self, delivery_id: &str, event_kind: &str, action: &str, message: &str) -> Result<()>;
    /// Most recent recorded webhook processing errors, newest first.
    async fn list_webhook_errors(&self, limit: i64) -> Result<Vec<WebhookErrorRecord>>;
}
