//! Pull-request and comment operations on the remote tracker, split out
//! from [`crate::RemoteTracker`] because they act on PRs/comments rather
//! than issues proper — the Development Workflow is the only caller.

use async_trait::async_trait;

use crate::error::Result;

/// What `openPr` hands back: enough to record and later merge.
#[derive(Debug, Clone)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

#[async_trait]
pub trait PrTracker: Send + Sync {
    async fn open_pr(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef>;

    async fn merge_pr(&self, owner: &str, repo: &str, installation_id: i64, pr_number: u64) -> Result<()>;

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        issue_number: u64,
        body: &str,
    ) -> Result<()>;
}
