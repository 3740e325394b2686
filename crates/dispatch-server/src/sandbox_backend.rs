//! HTTP client for the agent execution backend: a sandboxed
//! code-generation RPC this platform treats as opaque (spec.md §1 Scope —
//! "the agent execution backend... treated as an opaque RPC"). Request
//! construction and retry classification mirror
//! `dispatch_sync::GithubTracker`.

use async_trait::async_trait;
use dispatch_core::config::RetryConfig;
use dispatch_orchestrator::{AgentExecutionBackend, AgentReviewBackend, ExecuteInput, ExecuteOutput, OrchestratorError, ReviewOutput};
use dispatch_retry::{classify_http_status, classify_network_or_timeout, retry, Classification, RetryOutcome};
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 600;

pub struct HttpSandboxBackend {
    client: reqwest::Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl HttpSandboxBackend {
    pub fn new(base_url: String, retry_config: RetryConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS)).build()?;
        Ok(Self { client, base_url, retry_config })
    }

    fn classify(err: &OrchestratorError) -> Classification {
        match err {
            OrchestratorError::Backend(msg) => {
                if let Some(status) = msg.strip_prefix("http ").and_then(|rest| rest.split(':').next()).and_then(|s| s.parse().ok()) {
                    classify_http_status(status, None)
                } else {
                    classify_network_or_timeout()
                }
            }
            _ => Classification::Terminal,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, OrchestratorError> {
        let outcome = retry(&self.retry_config, Self::classify, || async {
            let response = self
                .client
                .post(format!("{}{path}", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| OrchestratorError::Backend(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(OrchestratorError::Backend(format!("http {}: {message}", status.as_u16())));
            }
            response.json::<serde_json::Value>().await.map_err(|e| OrchestratorError::Backend(e.to_string()))
        })
        .await;

        let RetryOutcome { value, error, .. } = outcome;
        value.ok_or_else(|| OrchestratorError::Backend(error.unwrap_or_default()))
    }
}

#[async_trait]
impl AgentExecutionBackend for HttpSandboxBackend {
    async fn execute(&self, input: ExecuteInput) -> dispatch_orchestrator::Result<ExecuteOutput> {
        let body = json!({
            "task": input.task,
            "context": input.context,
            "push": input.push,
            "branch": input.branch,
        });
        let raw = self.post("/execute", body).await?;
        serde_json::from_value(raw).map_err(|e| OrchestratorError::Backend(format!("malformed execute response: {e}")))
    }
}

#[async_trait]
impl AgentReviewBackend for HttpSandboxBackend {
    async fn review(&self, diff: &str, context: Option<&str>) -> dispatch_orchestrator::Result<ReviewOutput> {
        let body = json!({ "diff": diff, "context": context });
        let raw = self.post("/review", body).await?;
        serde_json::from_value(raw).map_err(|e| OrchestratorError::Backend(format!("malformed review response: {e}")))
    }
}
