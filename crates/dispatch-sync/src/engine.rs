//! The Sync Engine's three entry points — `process_webhook`, `push`,
//! `pull`, `sync` — plus the result/conflict shapes they share.

use chrono::{DateTime, Utc};
use dispatch_codec::{decode, encode, Relations};
use dispatch_core::config::{Conventions, RetryConfig, SyncStrategy};
use dispatch_core::{ExternalRef, Issue, IssueId, IssueStatus, Mapping};
use dispatch_retry::Classification;
use dispatch_store::IssueStore;
use std::collections::HashMap;

use crate::error::Result;
use crate::tracker::{RemoteIssue, RemoteTracker};
use crate::webhook::WebhookEvent;

/// A sync decision that couldn't be taken automatically: both sides
/// changed since the mapping's last snapshot.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub local_id: IssueId,
    pub remote_number: u64,
    pub local_updated_at: DateTime<Utc>,
    pub remote_updated_at: DateTime<Utc>,
    pub resolution: String,
}

#[derive(Debug, Clone)]
pub struct SyncIssueError {
    pub reference: String,
    pub message: String,
}

/// Outcome of any of the three entry points.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub created: Vec<Issue>,
    pub updated: Vec<Issue>,
    pub conflicts: Vec<Conflict>,
    pub errors: Vec<SyncIssueError>,
}

/// Deterministic local id for an issue first observed on the remote side,
/// scoped by (owner, repo, number) so re-observing the same remote issue
/// (e.g. after dropping a mapping) lands on the same local id.
fn remote_local_id(owner: &str, repo: &str, number: u64) -> IssueId {
    IssueId::new(format!("gh-{owner}-{repo}-{number}"))
}

fn mapping_for(owner: &str, repo: &str, installation_id: i64, local_id: &IssueId, remote: &RemoteIssue) -> Mapping {
    Mapping {
        local_id: local_id.clone(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        installation_id,
        remote_number: remote.number,
        local_snapshot: Utc::now(),
        remote_snapshot: remote.updated_at,
    }
}

fn issue_from_remote(
    owner: &str,
    repo: &str,
    local_id: &IssueId,
    remote: &RemoteIssue,
    conventions: &Conventions,
) -> Issue {
    let decoded = decode(&remote.payload, conventions);
    let now = Utc::now();
    Issue {
        id: local_id.clone(),
        title: remote.payload.title.clone(),
        description: decoded.description,
        labels: decoded.labels,
        priority: decoded.priority,
        issue_type: decoded.issue_type,
        status: decoded.status,
        assignee: remote.payload.assignees.first().cloned(),
        parent: decoded.relations.parent.map(IssueId::new),
        created_at: now,
        updated_at: now,
        closed_at: remote.closed_at,
        last_synced_remote: Some(now),
        external_ref: Some(ExternalRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number: remote.number,
            url: remote.url.clone(),
        }),
    }
}

/// Apply a remote observation onto an existing local issue's mutable
/// fields, leaving identity and creation bookkeeping untouched.
fn apply_remote_onto_local(local: &mut Issue, remote: &RemoteIssue, conventions: &Conventions) {
    let decoded = decode(&remote.payload, conventions);
    local.title = remote.payload.title.clone();
    local.description = decoded.description;
    local.labels = decoded.labels;
    local.priority = decoded.priority;
    local.issue_type = decoded.issue_type;
    local.status = decoded.status;
    local.assignee = remote.payload.assignees.first().cloned();
    local.closed_at = remote.closed_at;
    local.updated_at = Utc::now();
    local.last_synced_remote = Some(Utc::now());
}

/// Retry a store write a handful of times on `Concurrency` conflicts
/// (optimistic-lock contention is exactly the transient case this layer
/// exists for); anything else fails the attempt immediately.
async fn retry_store_write<T, F, Fut>(config: &RetryConfig, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = dispatch_store::Result<T>>,
{
    let classify = |e: &dispatch_store::StoreError| match e {
        dispatch_store::StoreError::Concurrency { .. } => Classification::Retryable { retry_after: None },
        _ => Classification::Terminal,
    };
    let outcome = dispatch_retry::retry(config, classify, op).await;
    match outcome.value {
        Some(v) => Ok(v),
        None => Err(dispatch_store::StoreError::Concurrency {
            resource: "issue".to_string(),
            id: outcome.error.unwrap_or_default(),
        }
        .into()),
    }
}

/// Process one webhook delivery. Duplicate deliveries (by `delivery_id`)
/// are skipped and return an empty result; only `kind = "issues"` carries
/// any effect, and only a subset of its actions.
pub async fn process_webhook(
    event: &WebhookEvent,
    store: &dyn IssueStore,
    conventions: &Conventions,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();

    if store.has_seen_webhook(&event.delivery_id).await? {
        return Ok(result);
    }
    if event.kind != "issues" {
        return Ok(result);
    }

    let owner = event.payload.repository.owner.login.clone();
    let repo = event.payload.repository.name.clone();
    let remote_payload = event.payload.issue.to_remote_payload();
    let number = event.payload.issue.number;
    let installation_id = event.payload.installation.as_ref().map(|i| i.id).unwrap_or(0);

    let outcome: Result<()> = async {
        let existing = store.get_mapping_by_remote(&owner, &repo, installation_id, number).await?;

        match event.action.as_str() {
            "opened" => {
                if existing.is_none() {
                    let remote = RemoteIssue {
                        number,
                        url: event.payload.issue.html_url.clone(),
                        updated_at: event.payload.issue.updated_at,
                        closed_at: event.payload.issue.closed_at,
                        payload: remote_payload,
                    };
                    let local_id = remote_local_id(&owner, &repo, number);
                    let issue = issue_from_remote(&owner, &repo, &local_id, &remote, conventions);
                    let mapping = mapping_for(&owner, &repo, installation_id, &local_id, &remote);
                    let created = store.create_issue(issue).await?;
                    store.upsert_mapping(mapping).await?;
                    result.created.push(created);
                }
            }
            "edited" | "labeled" | "unlabeled" | "assigned" | "unassigned" => {
                let remote = RemoteIssue {
                    number,
                    url: event.payload.issue.html_url.clone(),
                    updated_at: event.payload.issue.updated_at,
                    closed_at: event.payload.issue.closed_at,
                    payload: remote_payload,
                };
                match existing {
                    None => {
                        let local_id = remote_local_id(&owner, &repo, number);
                        let issue = issue_from_remote(&owner, &repo, &local_id, &remote, conventions);
                        let mapping = mapping_for(&owner, &repo, installation_id, &local_id, &remote);
                        let created = store.create_issue(issue).await?;
                        store.upsert_mapping(mapping).await?;
                        result.created.push(created);
                    }
                    Some(mapping) => {
                        let mut local = store.get_issue(&mapping.local_id).await?;
                        apply_remote_onto_local(&mut local, &remote, conventions);
                        let updated = store.update_issue(local).await?;
                        let mut mapping = mapping;
                        mapping.remote_snapshot = remote.updated_at;
                        mapping.local_snapshot = updated.updated_at;
                        store.upsert_mapping(mapping).await?;
                        result.updated.push(updated);
                    }
                }
            }
            "closed" | "reopened" => {
                let new_status = if event.action == "closed" { IssueStatus::Closed } else { IssueStatus::Open };
                let mapping = match existing {
                    Some(m) => m,
                    None => {
                        let remote = RemoteIssue {
                            number,
                            url: event.payload.issue.html_url.clone(),
                            updated_at: event.payload.issue.updated_at,
                            closed_at: event.payload.issue.closed_at,
                            payload: remote_payload.clone(),
                        };
                        let local_id = remote_local_id(&owner, &repo, number);
                        let issue = issue_from_remote(&owner, &repo, &local_id, &remote, conventions);
                        let mapping = mapping_for(&owner, &repo, installation_id, &local_id, &remote);
                        let created = store.create_issue(issue).await?;
                        store.upsert_mapping(mapping.clone()).await?;
                        result.created.push(created);
                        mapping
                    }
                };
                let mut local = store.get_issue(&mapping.local_id).await?;
                local.status = new_status;
                local.closed_at = if new_status == IssueStatus::Closed { event.payload.issue.closed_at } else { None };
                local.updated_at = Utc::now();
                let updated = store.update_issue(local).await?;
                result.updated.push(updated);
            }
            _ => {}
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            store.mark_webhook_seen(&event.delivery_id).await?;
        }
        Err(e) => {
            store.record_webhook_error(&event.delivery_id, &event.kind, &event.action, &e.to_string()).await?;
            result.errors.push(SyncIssueError { reference: format!("{owner}/{repo}#{number}"), message: e.to_string() });
        }
    }

    Ok(result)
}

/// Push local issues to the remote tracker: create a remote issue where
/// no mapping exists yet, otherwise update the existing one. Per-issue
/// errors are captured, not fatal to the batch.
pub async fn push(
    issues: &[Issue],
    owner: &str,
    repo: &str,
    installation_id: i64,
    tracker: &dyn RemoteTracker,
    store: &dyn IssueStore,
    conventions: &Conventions,
    retry_config: &RetryConfig,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let relations = Relations::default();

    for issue in issues {
        let outcome: Result<()> = async {
            let payload = encode(issue, &relations, conventions);
            let mapping = store.get_mapping_by_local(owner, repo, installation_id, &issue.id).await?;
            match mapping {
                Some(mapping) => {
                    let remote_ref = tracker.update_issue(owner, repo, installation_id, mapping.remote_number, &payload).await?;
                    let mut mapping = mapping;
                    mapping.local_snapshot = issue.updated_at;
                    mapping.remote_snapshot = remote_ref.updated_at;
                    retry_store_write(retry_config, || store.upsert_mapping(mapping.clone())).await?;
                    result.updated.push(issue.clone());
                }
                None => {
                    let remote_ref = tracker.create_issue(owner, repo, installation_id, &payload).await?;
                    let mapping = Mapping {
                        local_id: issue.id.clone(),
                        owner: owner.to_string(),
                        repo: repo.to_string(),
                        installation_id,
                        remote_number: remote_ref.number,
                        local_snapshot: issue.updated_at,
                        remote_snapshot: remote_ref.updated_at,
                    };
                    retry_store_write(retry_config, || store.upsert_mapping(mapping.clone())).await?;
                    result.created.push(issue.clone());
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            result.errors.push(SyncIssueError { reference: issue.id.to_string(), message: e.to_string() });
        }
    }

    Ok(result)
}

/// Pull remote issues into the local store. No deletion on either side:
/// an issue absent from the remote listing is simply not observed.
pub async fn pull(
    owner: &str,
    repo: &str,
    installation_id: i64,
    tracker: &dyn RemoteTracker,
    store: &dyn IssueStore,
    conventions: &Conventions,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let remotes = tracker.list_issues(owner, repo, installation_id).await?;

    for remote in remotes {
        let outcome: Result<()> = async {
            let mapping = store.get_mapping_by_remote(owner, repo, installation_id, remote.number).await?;
            match mapping {
                None => {
                    let local_id = remote_local_id(owner, repo, remote.number);
                    let issue = issue_from_remote(owner, repo, &local_id, &remote, conventions);
                    let mapping = mapping_for(owner, repo, installation_id, &local_id, &remote);
                    let created = store.create_issue(issue).await?;
                    store.upsert_mapping(mapping).await?;
                    result.created.push(created);
                }
                Some(mapping) => {
                    let mut local = store.get_issue(&mapping.local_id).await?;
                    apply_remote_onto_local(&mut local, &remote, conventions);
                    let updated = store.update_issue(local).await?;
                    let mut mapping = mapping;
                    mapping.remote_snapshot = remote.updated_at;
                    mapping.local_snapshot = updated.updated_at;
                    store.upsert_mapping(mapping).await?;
                    result.updated.push(updated);
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            result.errors.push(SyncIssueError { reference: remote.number.to_string(), message: e.to_string() });
        }
    }

    Ok(result)
}

/// Full bidirectional sync: lists the remote side, resolves every mapped
/// issue against its snapshot, and applies the configured conflict
/// resolution where both sides changed since the last sync.
pub async fn sync(
    owner: &str,
    repo: &str,
    installation_id: i64,
    strategy: SyncStrategy,
    tracker: &dyn RemoteTracker,
    store: &dyn IssueStore,
    conventions: &Conventions,
    retry_config: &RetryConfig,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let remotes = tracker.list_issues(owner, repo, installation_id).await?;
    let mappings = store.list_mappings(owner, repo, installation_id).await?;
    let by_remote_number: HashMap<u64, Mapping> =
        mappings.into_iter().map(|m| (m.remote_number, m)).collect();

    for remote in remotes {
        let outcome = sync_one(owner, repo, installation_id, &remote, by_remote_number.get(&remote.number), strategy, tracker, store, conventions, retry_config).await;
        match outcome {
            Ok(Some(SyncOutcome::Created(issue))) => result.created.push(issue),
            Ok(Some(SyncOutcome::Updated(issue))) => result.updated.push(issue),
            Ok(Some(SyncOutcome::Conflicted(issue, conflict))) => {
                result.conflicts.push(conflict);
                result.updated.push(issue);
            }
            Ok(None) => {}
            Err(e) => result.errors.push(SyncIssueError { reference: remote.number.to_string(), message: e.to_string() }),
        }
    }

    Ok(result)
}

enum SyncOutcome {
    Created(Issue),
    Updated(Issue),
    Conflicted(Issue, Conflict),
}

#[allow(clippy::too_many_arguments)]
async fn sync_one(
    owner: &str,
    repo: &str,
    installation_id: i64,
    remote: &RemoteIssue,
    mapping: Option<&Mapping>,
    strategy: SyncStrategy,
    tracker: &dyn RemoteTracker,
    store: &dyn IssueStore,
    conventions: &Conventions,
    retry_config: &RetryConfig,
) -> Result<Option<SyncOutcome>> {
    let Some(mapping) = mapping else {
        let local_id = remote_local_id(owner, repo, remote.number);
        let issue = issue_from_remote(owner, repo, &local_id, remote, conventions);
        let new_mapping = mapping_for(owner, repo, installation_id, &local_id, remote);
        let created = store.create_issue(issue).await?;
        store.upsert_mapping(new_mapping).await?;
        return Ok(Some(SyncOutcome::Created(created)));
    };

    let local = store.get_issue(&mapping.local_id).await?;
    let local_changed = local.updated_at > mapping.local_snapshot;
    let remote_changed = remote.updated_at > mapping.remote_snapshot;

    if local_changed && remote_changed {
        let (take_remote, resolution) = match strategy {
            SyncStrategy::GithubWins => (true, "github-wins"),
            SyncStrategy::BeadsWins => (false, "beads-wins"),
            SyncStrategy::NewestWins => {
                if remote.updated_at >= local.updated_at {
                    (true, "newest-wins:remote")
                } else {
                    (false, "newest-wins:local")
                }
            }
        };

        let conflict = Conflict {
            local_id: mapping.local_id.clone(),
            remote_number: remote.number,
            local_updated_at: local.updated_at,
            remote_updated_at: remote.updated_at,
            resolution: resolution.to_string(),
        };

        let resolved = if take_remote {
            let mut local = local;
            apply_remote_onto_local(&mut local, remote, conventions);
            let updated = store.update_issue(local).await?;
            let mut mapping = mapping.clone();
            mapping.remote_snapshot = remote.updated_at;
            mapping.local_snapshot = updated.updated_at;
            store.upsert_mapping(mapping).await?;
            updated
        } else {
            let relations = Relations::default();
            let payload = encode(&local, &relations, conventions);
            let remote_ref = tracker.update_issue(owner, repo, installation_id, remote.number, &payload).await?;
            let mut mapping = mapping.clone();
            mapping.local_snapshot = local.updated_at;
            mapping.remote_snapshot = remote_ref.updated_at;
            retry_store_write(retry_config, || store.upsert_mapping(mapping.clone())).await?;
            local
        };

        return Ok(Some(SyncOutcome::Conflicted(resolved, conflict)));
    }

    if remote_changed {
        let mut local = local;
        apply_remote_onto_local(&mut local, remote, conventions);
        let updated = store.update_issue(local).await?;
        let mut mapping = mapping.clone();
        mapping.remote_snapshot = remote.updated_at;
        mapping.local_snapshot = updated.updated_at;
        store.upsert_mapping(mapping).await?;
        return Ok(Some(SyncOutcome::Updated(updated)));
    }

    if local_changed {
        let relations = Relations::default();
        let payload = encode(&local, &relations, conventions);
        let remote_ref = tracker.update_issue(owner, repo, installation_id, remote.number, &payload).await?;
        let mut mapping = mapping.clone();
        mapping.local_snapshot = local.updated_at;
        mapping.remote_snapshot = remote_ref.updated_at;
        retry_store_write(retry_config, || store.upsert_mapping(mapping.clone())).await?;
        return Ok(Some(SyncOutcome::Updated(local)));
    }

    Ok(None)
}
