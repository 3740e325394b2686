//! A [`TokenProvider`] backed by a single static personal-access token
//! read from the environment, for deployments that authenticate as one
//! GitHub identity rather than a full GitHub App installation flow (which
//! is out of scope — spec.md only specifies the installation-token shape
//! the Sync Engine consumes, not how to mint one).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_sync::{Result, SyncError, TokenProvider};

pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_installation_token(&self, installation_id: i64) -> Result<(String, DateTime<Utc>)> {
        if self.token.is_empty() {
            return Err(SyncError::NoToken(installation_id));
        }
        Ok((self.token.clone(), Utc::now() + chrono::Duration::days(365)))
    }
}
