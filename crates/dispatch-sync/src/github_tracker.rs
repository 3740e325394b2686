//! `RemoteTracker` implementation against the GitHub REST API.
//!
//! Client construction follows the pattern already used for outbound HTTP
//! elsewhere in this workspace: a single shared `reqwest::Client` with a
//! fixed request timeout, built once and reused.

use async_trait::async_trait;
use dispatch_codec::RemotePayload;
use dispatch_core::config::RetryConfig;
use dispatch_retry::{classify_http_status, classify_network_or_timeout, retry, Classification, RetryOutcome};
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::pr_tracker::{PrTracker, PullRequestRef};
use crate::token_cache::{TokenCache, TokenProvider};
use crate::tracker::{RemoteIssue, RemoteIssueRef, RemoteTracker};
use crate::webhook::RemoteIssuePayload;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct GithubTracker {
    client: reqwest::Client,
    api_base: String,
    provider: Arc<dyn TokenProvider>,
    token_cache: TokenCache,
    retry_config: RetryConfig,
}

impl GithubTracker {
    pub fn new(provider: Arc<dyn TokenProvider>, retry_config: RetryConfig) -> reqwest::Result<Self> {
        Self::with_api_base(provider, retry_config, "https://api.github.com".to_string())
    }

    pub fn with_api_base(
        provider: Arc<dyn TokenProvider>,
        retry_config: RetryConfig,
        api_base: String,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, api_base, provider, token_cache: TokenCache::new(), retry_config })
    }

    fn classify(err: &SyncError) -> Classification {
        match err {
            SyncError::RemoteStatus { status, .. } => classify_http_status(*status, None),
            SyncError::Remote(e) if e.is_timeout() || e.is_connect() => classify_network_or_timeout(),
            _ => Classification::Terminal,
        }
    }

    /// Send one logical request: obtains a cached token, sends it, and on
    /// a 401 refreshes the token once and retries before giving up. The
    /// whole thing is then wrapped by the Retry Layer for transient
    /// (429/5xx/network) failures.
    async fn send(
        &self,
        installation_id: i64,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let outcome = retry(&self.retry_config, Self::classify, || async {
            let token = self.token_cache.get(installation_id, self.provider.as_ref()).await?;
            let response = self.build_request(&method, path, &body, &token).send().await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                let token = self.token_cache.refresh(installation_id, self.provider.as_ref()).await?;
                let response = self.build_request(&method, path, &body, &token).send().await?;
                return Self::parse_response(response).await;
            }
            Self::parse_response(response).await
        })
        .await;

        let RetryOutcome { value, error, .. } = outcome;
        value.ok_or_else(|| SyncError::RemoteStatus { status: 0, message: error.unwrap_or_default() })
    }

    fn build_request(
        &self,
        method: &Method,
        path: &str,
        body: &Option<serde_json::Value>,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.api_base);
        let mut builder = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "dispatch-sync");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteStatus { status: status.as_u16(), message });
        }
        response.json::<serde_json::Value>().await.map_err(SyncError::Remote)
    }
}

fn payload_to_create_body(payload: &RemotePayload) -> serde_json::Value {
    json!({
        "title": payload.title,
        "body": payload.body,
        "labels": payload.labels,
        "assignees": payload.assignees,
    })
}

fn payload_to_update_body(payload: &RemotePayload) -> serde_json::Value {
    let mut body = payload_to_create_body(payload);
    let state = match payload.state {
        dispatch_codec::RemoteState::Open => "open",
        dispatch_codec::RemoteState::Closed => "closed",
    };
    body["state"] = json!(state);
    body
}

fn to_remote_issue(raw: serde_json::Value) -> Result<RemoteIssue> {
    let issue: RemoteIssuePayload = serde_json::from_value(raw)?;
    Ok(RemoteIssue {
        number: issue.number,
        url: issue.html_url.clone(),
        updated_at: issue.updated_at,
        closed_at: issue.closed_at,
        payload: issue.to_remote_payload(),
    })
}

fn to_remote_issue_ref(raw: serde_json::Value) -> Result<RemoteIssueRef> {
    let issue: RemoteIssuePayload = serde_json::from_value(raw)?;
    Ok(RemoteIssueRef { number: issue.number, url: issue.html_url, updated_at: issue.updated_at })
}

#[async_trait]
impl RemoteTracker for GithubTracker {
    async fn list_issues(&self, owner: &str, repo: &str, installation_id: i64) -> Result<Vec<RemoteIssue>> {
        let path = format!("/repos/{owner}/{repo}/issues?state=all&per_page=100");
        let raw = self.send(installation_id, Method::GET, &path, None).await?;
        let items = raw.as_array().cloned().unwrap_or_default();
        items
            .into_iter()
            .filter(|item| item.get("pull_request").is_none())
            .map(to_remote_issue)
            .collect()
    }

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        number: u64,
    ) -> Result<RemoteIssue> {
        let path = format!("/repos/{owner}/{repo}/issues/{number}");
        let raw = self.send(installation_id, Method::GET, &path, None).await?;
        to_remote_issue(raw)
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        payload: &RemotePayload,
    ) -> Result<RemoteIssueRef> {
        let path = format!("/repos/{owner}/{repo}/issues");
        let body = payload_to_create_body(payload);
        let raw = self.send(installation_id, Method::POST, &path, Some(body)).await?;
        to_remote_issue_ref(raw)
    }

    async fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        number: u64,
        payload: &RemotePayload,
    ) -> Result<RemoteIssueRef> {
        let path = format!("/repos/{owner}/{repo}/issues/{number}");
        let body = payload_to_update_body(payload);
        let raw = self.send(installation_id, Method::PATCH, &path, Some(body)).await?;
        to_remote_issue_ref(raw)
    }
}

#[async_trait]
impl PrTracker for GithubTracker {
    async fn open_pr(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef> {
        let path = format!("/repos/{owner}/{repo}/pulls");
        let request_body = json!({ "title": title, "head": head_branch, "base": base_branch, "body": body });
        let raw = self.send(installation_id, Method::POST, &path, Some(request_body)).await?;
        let number = raw
            .get("number")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SyncError::RemoteStatus { status: 0, message: "missing pull request number".to_string() })?;
        let url = raw.get("html_url").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Ok(PullRequestRef { number, url })
    }

    async fn merge_pr(&self, owner: &str, repo: &str, installation_id: i64, pr_number: u64) -> Result<()> {
        let path = format!("/repos/{owner}/{repo}/pulls/{pr_number}/merge");
        self.send(installation_id, Method::PUT, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        installation_id: i64,
        issue_number: u64,
        body: &str,
    ) -> Result<()> {
        let path = format!("/repos/{owner}/{repo}/issues/{issue_number}/comments");
        self.send(installation_id, Method::POST, &path, Some(json!({ "body": body }))).await?;
        Ok(())
    }
}
