//! Retry Layer — exponential backoff with jitter plus transient-error
//! classification, wrapping any `() -> Future<Output = Result<T, E>>`.
//!
//! Classification is supplied by the caller as a closure returning
//! `Classification`; most callers compose a component-specific classifier
//! with [`classify_http_status`] via [`combine`], matching spec.md §4.E's
//! "composes with the default ... except an explicit not-retryable wins"
//! rule.

use dispatch_core::config::RetryConfig;
use std::time::Duration;

/// Whether a failed operation should be retried, and after how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Retry after the given delay, or after a computed backoff delay if
    /// `None` (e.g. no `Retry-After` header was present).
    Retryable { retry_after: Option<Duration> },
    /// Do not retry; surface the error immediately.
    Terminal,
}

/// Combine a component's default classification with an optional
/// caller-supplied override. `None` means "no opinion, use the default".
/// Any `Some(_)` from the override is a definite decision and wins
/// outright — this is what lets a caller force a normally-transient
/// status code to be treated as terminal, or vice versa.
pub fn combine(default: Classification, custom: Option<Classification>) -> Classification {
    custom.unwrap_or(default)
}

/// Default classification for an HTTP-shaped remote call: 429 and 5xx are
/// retryable (429's `Retry-After`, if present, is authoritative), other
/// 4xx are terminal.
pub fn classify_http_status(status: u16, retry_after: Option<Duration>) -> Classification {
    match status {
        429 => Classification::Retryable { retry_after },
        500..=599 => Classification::Retryable { retry_after: None },
        _ => Classification::Terminal,
    }
}

/// Default classification for recognizable network-layer failures
/// (connection refused/reset, DNS failure, socket hangup) and
/// timeouts/cancellations: always retryable.
pub fn classify_network_or_timeout() -> Classification {
    Classification::Retryable { retry_after: None }
}

/// The outcome of a (possibly retried) operation.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub success: bool,
    pub value: Option<T>,
    pub error: Option<String>,
    pub attempts: u32,
    pub total_delay_ms: u64,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self.value {
            Some(v) if self.success => Ok(v),
            _ => Err(self.error.unwrap_or_else(|| "operation failed".to_string())),
        }
    }
}

/// Run `op` to completion, retrying transient failures per `config` with
/// exponential backoff and jitter. `classify` decides, per failure,
/// whether to retry and with what delay.
#[tracing::instrument(skip_all)]
pub async fn retry<T, E, F, Fut>(
    config: &RetryConfig,
    classify: impl Fn(&E) -> Classification,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts: u32 = 0;
    let mut total_delay_ms: u64 = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                return RetryOutcome {
                    success: true,
                    value: Some(value),
                    error: None,
                    attempts,
                    total_delay_ms,
                };
            }
            Err(err) => {
                let message = err.to_string();
                match classify(&err) {
                    Classification::Terminal => {
                        tracing::debug!(attempt = attempts, %message, "terminal error, not retrying");
                        return RetryOutcome {
                            success: false,
                            value: None,
                            error: Some(message),
                            attempts,
                            total_delay_ms,
                        };
                    }
                    Classification::Retryable { retry_after } => {
                        if attempts > config.max_retries {
                            tracing::warn!(attempts, %message, "exhausted retries");
                            return RetryOutcome {
                                success: false,
                                value: None,
                                error: Some(format!("exhausted retries after {attempts} attempts: {message}")),
                                attempts,
                                total_delay_ms,
                            };
                        }
                        let delay = retry_after
                            .unwrap_or_else(|| backoff_delay(config, attempts - 1))
                            .min(Duration::from_millis(config.max_delay_ms));
                        total_delay_ms += delay.as_millis() as u64;
                        tracing::warn!(
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            %message,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

fn backoff_delay(config: &RetryConfig, attempt_index: u32) -> Duration {
    let base = config.base_delay_ms as f64;
    let exponential = base * 2f64.powi(attempt_index as i32);
    let jitter = 1.0 + (rand::random::<f64>() - 0.5) * config.jitter_factor;
    let delay_ms = (exponential * jitter).clamp(0.0, config.max_delay_ms as f64);
    Duration::from_millis(delay_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Failure(&'static str, bool); // (message, retryable)

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    fn classify(f: &Failure) -> Classification {
        if f.1 {
            Classification::Retryable { retry_after: None }
        } else {
            Classification::Terminal
        }
    }

    #[tokio::test]
    async fn retry_eventually_succeeds_when_condition_clears() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        };
        let attempts = AtomicU32::new(0);
        let outcome = retry(&config, classify, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Failure("still failing", true))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.value, Some(42));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        };
        let attempts = AtomicU32::new(0);
        let outcome: RetryOutcome<i32> = retry(&config, classify, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure("bad request", false)) }
        })
        .await;
        assert!(!outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        };
        let attempts = AtomicU32::new(0);
        let outcome: RetryOutcome<i32> = retry(&config, classify, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure("still down", true)) }
        })
        .await;
        assert!(!outcome.success);
        // initial attempt + 2 retries = 3 total attempts
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.error.unwrap().contains("exhausted retries"));
    }

    #[test]
    fn classify_http_status_treats_429_and_5xx_as_retryable() {
        assert!(matches!(
            classify_http_status(429, None),
            Classification::Retryable { .. }
        ));
        assert!(matches!(
            classify_http_status(503, None),
            Classification::Retryable { .. }
        ));
        assert!(matches!(classify_http_status(404, None), Classification::Terminal));
        assert!(matches!(classify_http_status(422, None), Classification::Terminal));
    }

    #[test]
    fn combine_lets_explicit_override_win() {
        let default = Classification::Retryable { retry_after: None };
        assert_eq!(combine(default, Some(Classification::Terminal)), Classification::Terminal);
        assert_eq!(combine(Classification::Terminal, Some(default)), default);
        assert_eq!(combine(default, None), default);
    }

    #[test]
    fn backoff_delay_respects_max_delay_cap() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
            jitter_factor: 0.0,
        };
        // attempt_index 10 would be 1000*2^10 without the cap.
        let delay = backoff_delay(&config, 10);
        assert!(delay <= Duration::from_millis(2000));
    }
}
