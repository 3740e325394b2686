//! The `RemoteTracker` contract: whatever the Sync Engine needs from a
//! remote issue tracker, independent of which one it talks to. The only
//! implementation shipped is [`GithubTracker`]; tests substitute a fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_codec::RemotePayload;

use crate::error::Result;

/// One issue as the remote tracker reports it, with the bookkeeping
/// fields the Sync Engine needs beyond the untyped payload.
#[derive(Debug, Clone)]
pub struct RemoteIssue {
    pub number: u64,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub payload: RemotePayload,
}

/// What `createRemote`/`updateRemote` hand back: enough to record or
/// refresh a mapping.
#[derive(Debug, Clone)]
pub struct RemoteIssueRef {
    pub number: u64,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteTracker: Send + Sync {
    async fn list_issues(&self, owner: &str, repo: &str, installation_id: i64) -> Result<Vec<RemoteIssue>>;

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        number: u64,
    ) -> Result<RemoteIssue>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        payload: &RemotePayload,
    ) -> Result<RemoteIssueRef>;

    async fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        number: u64,
        payload: &RemotePayload,
    ) -> Result<RemoteIssueRef>;
}
