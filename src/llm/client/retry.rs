//! Bounded retry with exponential backoff around a [`TextGenerator`].
//!
//! Only [`LlmError::BackendUnavailable`] is retried. Timeouts, HTTP errors
//! and malformed responses are returned on the first occurrence.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{LlmError, TextGenerator};

/// Backoff exponent cap (delays stop growing after 2^5 * base).
const MAX_BACKOFF_EXPONENT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::from_secs(1))
    }

    /// Delay before retry number `attempt` (1-based): base, 2x, 4x, ...
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX)
    }
}

/// Wraps a generator and retries transient connection failures.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for RetryingGenerator<G> {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Generation backend unavailable, retry {}/{} in {:?}: {}",
                        attempt, self.policy.max_retries, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, LlmError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("done".to_string()))
        }
    }

    fn unavailable() -> LlmError {
        LlmError::BackendUnavailable {
            endpoint: "http://localhost:1".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_for_backoff() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(32));
        // Capped at 2^5
        assert_eq!(policy.delay_for(9), Duration::from_secs(32));
    }

    #[test]
    fn test_delay_for_saturates_huge_base() {
        let base = Duration::from_secs(u64::MAX / 2);
        let policy = RetryPolicy::new(3, base);
        assert_eq!(policy.delay_for(1), base);
        assert_eq!(policy.delay_for(3), Duration::MAX);
    }

    #[tokio::test]
    async fn test_retries_connection_failures() {
        let gen = RetryingGenerator::new(
            Scripted::new(vec![Err(unavailable()), Err(unavailable())]),
            fast(3),
        );
        assert_eq!(gen.generate("p").await.unwrap(), "done");
        assert_eq!(gen.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let gen = RetryingGenerator::new(
            Scripted::new(vec![Err(unavailable()), Err(unavailable()), Err(unavailable())]),
            fast(2),
        );
        let err = gen.generate("p").await.unwrap_err();
        assert!(matches!(err, LlmError::BackendUnavailable { .. }));
        assert_eq!(gen.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_policy_calls_once() {
        let gen = RetryingGenerator::new(Scripted::new(vec![Err(unavailable())]), RetryPolicy::none());
        assert!(gen.generate("p").await.is_err());
        assert_eq!(gen.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_does_not_retry_protocol_faults() {
        for err in [
            LlmError::BackendError {
                status: 500,
                body: "boom".to_string(),
            },
            LlmError::MalformedResponse("missing response".to_string()),
            LlmError::Timeout(Duration::from_secs(1)),
        ] {
            let gen = RetryingGenerator::new(Scripted::new(vec![Err(err)]), fast(5));
            assert!(gen.generate("p").await.is_err());
            assert_eq!(gen.inner().calls(), 1);
        }
    }
}
