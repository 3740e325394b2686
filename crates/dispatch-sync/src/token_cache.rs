//! Per-installation access token cache. Tokens are obtained on demand and
//! cached with expiry; refresh is serialized per-installation so a storm
//! of concurrent requests for the same installation doesn't mint a token
//! per request (mirrors the per-entity granularity of the lock table this
//! workspace already uses for other shared state).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Result, SyncError};

/// Mints installation access tokens. The exact exchange (a GitHub App JWT
/// traded for an installation token, or any other scheme) is the caller's
/// concern; the cache only needs an expiry to know when to call this again.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_installation_token(&self, installation_id: i64) -> Result<(String, DateTime<Utc>)>;
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Tokens are treated as expired this far ahead of their real expiry, so a
/// request built with one doesn't land just as it turns over server-side.
const EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Default)]
pub struct TokenCache {
    entries: DashMap<i64, CachedToken>,
    refresh_locks: DashMap<i64, Arc<AsyncMutex<()>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a cached, unexpired token, or mint and cache a fresh one.
    pub async fn get(&self, installation_id: i64, provider: &dyn TokenProvider) -> Result<String> {
        if let Some(token) = self.valid_cached(installation_id) {
            return Ok(token);
        }
        self.refresh(installation_id, provider).await
    }

    /// Force a fresh token regardless of cache state, e.g. after a 401.
    pub async fn refresh(&self, installation_id: i64, provider: &dyn TokenProvider) -> Result<String> {
        let lock = self
            .refresh_locks
            .entry(installation_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another waiter may have refreshed while we waited for the lock.
        if let Some(token) = self.valid_cached(installation_id) {
            return Ok(token);
        }

        let (token, expires_at) = provider.fetch_installation_token(installation_id).await?;
        self.entries.insert(installation_id, CachedToken { token: token.clone(), expires_at });
        tracing::debug!(installation_id, %expires_at, "installation token refreshed");
        Ok(token)
    }

    fn valid_cached(&self, installation_id: i64) -> Option<String> {
        self.entries.get(&installation_id).and_then(|entry| {
            let cutoff = Utc::now() + chrono::Duration::seconds(EXPIRY_SKEW_SECS);
            (entry.expires_at > cutoff).then(|| entry.token.clone())
        })
    }
}

/// Convenience for callers that know no provider is configured — surfaces
/// as a clear error rather than a panic.
pub struct NoTokenProvider;

#[async_trait]
impl TokenProvider for NoTokenProvider {
    async fn fetch_installation_token(&self, installation_id: i64) -> Result<(String, DateTime<Utc>)> {
        Err(SyncError::NoToken(installation_id))
    }
}
