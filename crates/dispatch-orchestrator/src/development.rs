//! Development Workflow (spec.md §4.I): the per-assignment state machine
//! that drives an agent from `in_progress` through to a merged PR.

use async_trait::async_trait;
use dispatch_core::config::RetryConfig;
use dispatch_core::{IssueId, IssueStatus};
use dispatch_retry::{retry, Classification, RetryOutcome};
use dispatch_store::IssueStore;
use dispatch_sync::{PrTracker, RemoteTracker};
use dispatch_workflow::{run_workflow, Step, WorkflowError, WorkflowRuntime};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::assignment::DevelopmentTrigger;
use crate::error::{OrchestratorError, Result};

/// Input to the agent execution backend for one `execute` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteInput {
    pub task: String,
    pub context: Option<String>,
    pub push: bool,
    pub branch: String,
}

/// What the agent execution backend hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOutput {
    pub diff: String,
    pub files_changed: u32,
    pub pushed_branch: String,
    pub test_results: Option<String>,
}

/// What the agent review backend hands back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub approved: bool,
    pub summary: String,
    pub comments: Vec<String>,
}

/// Invokes whatever runs an agent against a task — a sandboxed coding
/// agent in production, a scripted fake in tests.
#[async_trait]
pub trait AgentExecutionBackend: Send + Sync {
    async fn execute(&self, input: ExecuteInput) -> Result<ExecuteOutput>;
}

/// Invokes whatever reviews the diff an execution produced.
#[async_trait]
pub trait AgentReviewBackend: Send + Sync {
    async fn review(&self, diff: &str, context: Option<&str>) -> Result<ReviewOutput>;
}

/// Combines the issue-CRUD and PR/comment surfaces the workflow needs from
/// the remote tracker; blanket-implemented for anything offering both.
pub trait WorkflowTracker: RemoteTracker + PrTracker {}
impl<T: RemoteTracker + PrTracker + ?Sized> WorkflowTracker for T {}

/// Outcome of one Development Workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DevelopmentOutcome {
    /// The agent produced no changes; the issue was closed as a no-op.
    NoOp { reason: String },
    /// The PR merged, the issue closed, and these issues may now be
    /// ready as a result (spec.md §4.I "notify-dependents").
    Done { pr_number: u64, pr_url: String, unblocked: Vec<IssueId> },
}

/// Everything the workflow body needs beyond its serializable trigger
/// params. Not itself part of the durable step log.
#[derive(Clone)]
pub struct DevelopmentDeps {
    pub store: Arc<dyn IssueStore>,
    pub tracker: Arc<dyn WorkflowTracker>,
    pub agent_backend: Arc<dyn AgentExecutionBackend>,
    pub review_backend: Arc<dyn AgentReviewBackend>,
    pub sandbox_retry: RetryConfig,
    pub pr_approval_timeout: Duration,
}

fn classify_backend(_err: &OrchestratorError) -> Classification {
    Classification::Retryable { retry_after: None }
}

/// Sandbox agent calls have no retry layer of their own (unlike
/// `GithubTracker`, which wraps every HTTP call internally), so the
/// workflow wraps them here instead.
async fn run_with_retry<T, F, Fut>(config: &RetryConfig, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = retry(config, classify_backend, op).await;
    let RetryOutcome { value, error, .. } = outcome;
    value.ok_or_else(|| OrchestratorError::Backend(error.unwrap_or_default()))
}

/// `title-slug` suitable for a branch name: lowercase alphanumerics,
/// runs of anything else collapsed to a single `-`.
fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut prev_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Start (or replay-resume) a Development Workflow instance and drive it
/// to completion.
pub async fn start_development_workflow(
    runtime: &WorkflowRuntime,
    instance_id: &str,
    deps: DevelopmentDeps,
    trigger: DevelopmentTrigger,
) -> Result<DevelopmentOutcome> {
    let outcome = run_workflow(runtime, instance_id, "development", trigger, move |step, trigger| {
        development_workflow_body(step, trigger, deps)
    })
    .await?;
    Ok(outcome)
}

async fn development_workflow_body(
    step: Step,
    trigger: DevelopmentTrigger,
    deps: DevelopmentDeps,
) -> dispatch_workflow::Result<DevelopmentOutcome> {
    let owner = trigger.owner;
    let repo = trigger.repo;
    let installation_id = trigger.installation_id;
    let issue_id = trigger.issue_id;
    let context = trigger.context;

    let store = deps.store;
    let tracker = deps.tracker;
    let agent_backend = deps.agent_backend;
    let review_backend = deps.review_backend;
    let sandbox_retry = deps.sandbox_retry;
    let pr_approval_timeout = deps.pr_approval_timeout;

    // start -> executing: status <- in_progress
    {
        let store = store.clone();
        let issue_id = issue_id.clone();
        step.do_step("update-in-progress", move || async move {
            let mut issue = store.get_issue(&issue_id).await.map_err(OrchestratorError::from)?;
            issue.status = IssueStatus::InProgress;
            store.update_issue(issue).await.map_err(OrchestratorError::from)?;
            Ok(())
        })
        .await?;
    }

    let issue = store.get_issue(&issue_id).await.map_err(OrchestratorError::from)?;
    let branch = format!("{issue_id}-{}", slugify(&issue.title));

    let execution: ExecuteOutput = {
        let agent_backend = agent_backend.clone();
        let branch = branch.clone();
        let task = issue.title.clone();
        step.do_step("execute", move || async move {
            let result = run_with_retry(&sandbox_retry, move || {
                let agent_backend = agent_backend.clone();
                let input = ExecuteInput {
                    task: task.clone(),
                    context: context.clone(),
                    push: true,
                    branch: branch.clone(),
                };
                async move { agent_backend.execute(input).await }
            })
            .await;
            result.map_err(WorkflowError::from)
        })
        .await?
    };

    if execution.files_changed == 0 {
        let reason = "no changes".to_string();
        {
            let store = store.clone();
            let issue_id = issue_id.clone();
            let reason = reason.clone();
            step.do_step("close-noop", move || async move {
                store.close_issue(&issue_id).await.map_err(OrchestratorError::from)?;
                Ok(reason)
            })
            .await?;
        }
        return Ok(DevelopmentOutcome::NoOp { reason });
    }

    // reviewing
    let review: ReviewOutput = {
        let review_backend = review_backend.clone();
        let diff = execution.diff.clone();
        step.do_step("review", move || async move {
            review_backend.review(&diff, None).await.map_err(WorkflowError::from)
        })
        .await?
    };

    if !review.approved {
        {
            let tracker = tracker.clone();
            let comments = review.comments.clone();
            let external = issue.external_ref.clone();
            let owner = owner.clone();
            let repo = repo.clone();
            step.do_step("post-review-comments", move || async move {
                if let Some(external) = external {
                    for comment in &comments {
                        tracker
                            .create_comment(&owner, &repo, installation_id, external.number, comment)
                            .await
                            .map_err(OrchestratorError::from)?;
                    }
                }
                Ok(())
            })
            .await?;
        }

        {
            let store = store.clone();
            let issue_id = issue_id.clone();
            step.do_step("mark-blocked", move || async move {
                let mut issue = store.get_issue(&issue_id).await.map_err(OrchestratorError::from)?;
                issue.status = IssueStatus::Blocked;
                store.update_issue(issue).await.map_err(OrchestratorError::from)?;
                Ok(())
            })
            .await?;
        }

        return Err(OrchestratorError::ReviewRejected(review.summary).into());
    }

    // creating-pr
    let (pr_number, pr_url): (u64, String) = {
        let tracker = tracker.clone();
        let owner = owner.clone();
        let repo = repo.clone();
        let branch = branch.clone();
        let title = issue.title.clone();
        let body = execution.diff.clone();
        step.do_step("open-pr", move || async move {
            let pr = tracker
                .open_pr(&owner, &repo, installation_id, &branch, "main", &title, &body)
                .await
                .map_err(OrchestratorError::from)?;
            Ok((pr.number, pr.url))
        })
        .await?
    };

    // awaiting pr_approved
    match step.wait_for_event("pr_approved", pr_approval_timeout).await {
        Ok(_payload) => {}
        Err(WorkflowError::EventTimeout { .. }) => {
            let store = store.clone();
            let issue_id = issue_id.clone();
            step.do_step("mark-blocked-timeout", move || async move {
                let mut issue = store.get_issue(&issue_id).await.map_err(OrchestratorError::from)?;
                issue.status = IssueStatus::Blocked;
                store.update_issue(issue).await.map_err(OrchestratorError::from)?;
                Ok(())
            })
            .await?;
            return Err(OrchestratorError::ApprovalTimeout.into());
        }
        Err(other) => return Err(other),
    }

    // merging
    {
        let tracker = tracker.clone();
        let owner = owner.clone();
        let repo = repo.clone();
        step.do_step("merge-pr", move || async move {
            tracker.merge_pr(&owner, &repo, installation_id, pr_number).await.map_err(OrchestratorError::from)?;
            Ok(())
        })
        .await?;
    }

    {
        let store = store.clone();
        let issue_id = issue_id.clone();
        step.do_step("close-issue", move || async move {
            store.close_issue(&issue_id).await.map_err(OrchestratorError::from)?;
            Ok(())
        })
        .await?;
    }

    let unblocked: Vec<IssueId> = {
        let store = store.clone();
        let issue_id = issue_id.clone();
        step.do_step("notify-dependents", move || async move {
            let snapshot = store.dag_snapshot().await.map_err(OrchestratorError::from)?;
            let dag = dispatch_dag::DagEngine::new(&snapshot);
            let ids: Vec<IssueId> = dag.unblocks(&issue_id).into_iter().map(|i| i.id.clone()).collect();
            for id in &ids {
                tracing::info!(issue_id = %issue_id, unblocked = %id, "dependent unblocked by close");
            }
            Ok(ids)
        })
        .await?
    };

    Ok(DevelopmentOutcome::Done { pr_number, pr_url, unblocked })
}
