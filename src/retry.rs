//! Bounded retry around a single chunk delivery.
//!
//! Delay before attempt `n + 1` is `backoff_base × n` (linear). Each attempt
//! runs under its own deadline; an expired deadline becomes a retryable
//! `Timeout`.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ProofreadError;
use crate::progress::{ProgressEvent, ProgressReporter};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2000;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
        }
    }
}

impl RetryPolicy {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Position of the chunk being delivered, for progress and error tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    pub index: usize,
    pub total: usize,
}

/// Per-chunk retry bookkeeping. Lives for one chunk's delivery only.
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    last_error: Option<ProofreadError>,
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made.
///
/// Non-retryable errors propagate unchanged. When every attempt fails with a
/// retryable error, the last error is returned wrapped in
/// [`ProofreadError::ChunkFailed`] carrying `position`.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    position: ChunkPosition,
    progress: &dyn ProgressReporter,
    mut attempt_fn: F,
) -> Result<T, ProofreadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProofreadError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let deadline = policy.attempt_timeout();
    let mut state = RetryState {
        attempt: 0,
        last_error: None,
    };

    while state.attempt < max_attempts {
        state.attempt += 1;

        let outcome = match tokio::time::timeout(deadline, attempt_fn(state.attempt)).await {
            Ok(result) => result,
            Err(_) => Err(ProofreadError::Timeout(deadline.as_millis() as u64)),
        };

        match outcome {
            Ok(value) => {
                if state.attempt > 1 {
                    tracing::info!(
                        chunk = position.index,
                        attempts = state.attempt,
                        "block delivered after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if state.attempt < max_attempts {
                    let delay = policy.backoff(state.attempt);
                    tracing::warn!(
                        chunk = position.index,
                        total = position.total,
                        attempt = state.attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    progress.report(&ProgressEvent::Retrying {
                        index: position.index,
                        total: position.total,
                        attempt: state.attempt + 1,
                        max_attempts,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
                state.last_error = Some(e);
            }
        }
    }

    let source = state
        .last_error
        .unwrap_or_else(|| ProofreadError::Other("retry loop made no attempts".to_string()));
    tracing::error!(
        chunk = position.index,
        total = position.total,
        attempts = state.attempt,
        error = %source,
        "retry budget exhausted"
    );
    Err(ProofreadError::ChunkFailed {
        index: position.index,
        total: position.total,
        source: Box::new(source),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::progress::{NoProgress, RecordingProgress};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1,
            attempt_timeout_secs: 5,
        }
    }

    const POS: ChunkPosition = ChunkPosition { index: 2, total: 3 };

    fn transient() -> ProofreadError {
        ProofreadError::Provider {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let progress = RecordingProgress::new();
        let c = calls.clone();
        let result = with_retry(&fast_policy(), POS, &progress, move |attempt| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(format!("payload {attempt}"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "payload 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let delays: Vec<Duration> = progress
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Retrying { delay, .. } => Some(delay),
                _ => None,
            })
            .collect();
        assert_eq!(delays.len(), 2, "k-1 backoff delays");
        assert!(delays[1] > delays[0], "delays must increase: {delays:?}");
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retry(&fast_policy(), POS, &NoProgress, move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ProofreadError::AuthFailed {
                    message: "Incorrect API key".to_string(),
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ProofreadError::AuthFailed { .. })));
    }

    #[tokio::test]
    async fn exhaustion_tags_last_error_with_position() {
        let result: Result<(), _> =
            with_retry(&fast_policy(), POS, &NoProgress, |attempt| async move {
                Err(ProofreadError::Provider {
                    status: 502,
                    message: format!("bad gateway {attempt}"),
                })
            })
            .await;

        match result {
            Err(ProofreadError::ChunkFailed {
                index,
                total,
                source,
            }) => {
                assert_eq!((index, total), (2, 3));
                assert!(source.to_string().contains("bad gateway 3"), "got: {source}");
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attempt_deadline_becomes_retryable_timeout() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_base_ms: 1,
            attempt_timeout_secs: 1,
        };
        let result = with_retry(&policy, POS, &NoProgress, |attempt| async move {
            if attempt == 1 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, ProofreadError>(attempt)
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn backoff_is_linear() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_millis(2000));
        assert_eq!(p.backoff(2), Duration::from_millis(4000));
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.attempt_timeout(), Duration::from_secs(90));
    }
}
