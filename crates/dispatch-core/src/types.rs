//! Core data model: `Issue`, dependency edges, cross-tracker mappings and
//! the per-repo sync configuration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable local identifier for an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of work an issue represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Feature,
    Task,
    Epic,
    Chore,
}

impl Default for IssueType {
    fn default() -> Self {
        Self::Task
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Task => "task",
            Self::Epic => "epic",
            Self::Chore => "chore",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of an issue. Advisory except where the DAG Engine is
/// canonical for readiness (see `dispatch-dag`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl Default for IssueStatus {
    fn default() -> Self {
        Self::Open
    }
}

/// Reference to the issue's counterpart on the remote tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub url: String,
}

/// The central entity: a unit of work tracked locally and, optionally,
/// mirrored on a remote tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub priority: u8,
    pub issue_type: IssueType,
    pub status: IssueStatus,
    pub assignee: Option<String>,
    pub parent: Option<IssueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_synced_remote: Option<DateTime<Utc>>,
    pub external_ref: Option<ExternalRef>,
}

impl Issue {
    /// Construct a brand-new local-only issue with sensible defaults.
    pub fn new(id: impl Into<IssueId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            labels: Vec::new(),
            priority: 2,
            issue_type: IssueType::Task,
            status: IssueStatus::Open,
            assignee: None,
            parent: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            last_synced_remote: None,
            external_ref: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == IssueStatus::Closed
    }
}

/// The kind of a directed dependency edge between two issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// `from` cannot be considered ready until `to` closes.
    Blocks,
    Related,
    Parent,
    Discovers,
}

/// A directed edge `from -> to` of the given kind. Only `Blocks` edges
/// contribute to readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: IssueId,
    pub to: IssueId,
    pub kind: DependencyKind,
}

/// Correspondence between a local issue and a remote tracker issue number,
/// scoped to one (owner, repo, installation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub local_id: IssueId,
    pub owner: String,
    pub repo: String,
    pub installation_id: i64,
    pub remote_number: u64,
    /// `local.updated_at` observed at the last successful sync.
    pub local_snapshot: DateTime<Utc>,
    /// The remote's `updated_at` observed at the last successful sync.
    pub remote_snapshot: DateTime<Utc>,
}

impl Mapping {
    pub fn scope(&self) -> (String, String, i64) {
        (self.owner.clone(), self.repo.clone(), self.installation_id)
    }
}

/// Per-repository sync enablement and last-run status, iterated by the
/// Reconciliation Workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub owner: String,
    pub repo: String,
    pub installation_id: i64,
    pub sync_enabled: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
}

impl RepoConfig {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Never,
    Ok,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_issue_has_open_defaults() {
        let issue = Issue::new("L1", "Fix auth");
        assert_eq!(issue.status, IssueStatus::Open);
        assert_eq!(issue.priority, 2);
        assert_eq!(issue.issue_type, IssueType::Task);
        assert!(!issue.is_closed());
    }

    #[test]
    fn issue_id_display_round_trips() {
        let id = IssueId::from("abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }
}
