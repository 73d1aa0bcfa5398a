use std::{future::Future, num::NonZeroUsize, time::Duration};

use kube::Error as KubeError;
use tokio::time::sleep;
use tracing::debug;

const DEFAULT_MAX_ATTEMPTS: NonZeroUsize = NonZeroUsize::new(3).unwrap();

/// Retry policy applied to each counting call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first call.
    pub max_attempts: NonZeroUsize,
    /// Initial wait duration before the next retry.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff wait.
    pub max_backoff: Duration,
    /// Multiplication factor for exponential backoff.
    pub backoff_multiplier: f64,
    /// Error classifier for retry decisions.
    pub is_retryable: fn(&KubeError) -> bool,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn never() -> Self {
        Self::default().with_max_attempts(NonZeroUsize::MIN)
    }

    pub fn with_max_attempts(mut self, max_attempts: NonZeroUsize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            is_retryable: default_retryable_error,
        }
    }
}

/// Default retry condition for [`kube::Error`].
///
/// For `Api` errors, retries only on transient HTTP status codes (`408`, `429`, `5xx`).
/// Forbidden, not-found and method-not-allowed answers are final.
/// For other error types (transport/serialization/etc.), retries are enabled.
pub fn default_retryable_error(error: &KubeError) -> bool {
    match error {
        KubeError::Api(response) => matches!(response.code, 408 | 429 | 500..=599),
        _ => true,
    }
}

fn next_backoff(current: Duration, policy: &RetryPolicy) -> Duration {
    current
        .mul_f64(policy.backoff_multiplier.max(1.0))
        .min(policy.max_backoff)
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// or the policy's attempts are used up.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, KubeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KubeError>>,
{
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);
    let mut attempts = 0usize;

    loop {
        attempts = attempts.saturating_add(1);
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempts >= policy.max_attempts.get() || !(policy.is_retryable)(&error) {
                    return Err(error);
                }
                debug!(attempts, ?backoff, %error, "retrying");
                sleep(backoff).await;
                backoff = next_backoff(backoff, policy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use kube::Error as KubeError;

    use super::{RetryPolicy, default_retryable_error, retry_with_policy};
    use crate::discover::tests::api_error;

    fn max_attempts(attempts: usize) -> NonZeroUsize {
        NonZeroUsize::new(attempts).expect("max attempts must be > 0")
    }

    fn instant_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts(attempts))
            .with_initial_backoff(Duration::ZERO)
            .with_max_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mut attempts = 0usize;
        let result = retry_with_policy(&instant_policy(5), || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(api_error(500))
                } else {
                    Ok(current)
                }
            }
        })
        .await
        .expect("retry should eventually succeed");

        assert_eq!(result, 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn stops_on_forbidden() {
        let mut attempts = 0usize;
        let err = retry_with_policy::<(), _, _>(&instant_policy(5), || {
            attempts += 1;
            async { Err(api_error(403)) }
        })
        .await
        .expect_err("403 should not be retried");

        match err {
            KubeError::Api(response) => assert_eq!(response.code, 403),
            _ => panic!("expected api error"),
        }
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_retryable_error() {
        let mut attempts = 0usize;
        let err = retry_with_policy::<(), _, _>(&instant_policy(3), || {
            attempts += 1;
            async { Err(api_error(503)) }
        })
        .await
        .expect_err("retryable error should eventually exhaust attempts");

        match err {
            KubeError::Api(response) => assert_eq!(response.code, 503),
            _ => panic!("expected api error"),
        }
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn never_makes_a_single_attempt() {
        let mut attempts = 0usize;
        let _ = retry_with_policy::<(), _, _>(&RetryPolicy::never(), || {
            attempts += 1;
            async { Err(api_error(503)) }
        })
        .await;

        assert_eq!(attempts, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default().with_max_backoff(Duration::from_millis(300));
        assert_eq!(
            super::next_backoff(Duration::from_millis(200), &policy),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn default_retryable_classifies_api_codes() {
        assert!(default_retryable_error(&api_error(408)));
        assert!(default_retryable_error(&api_error(429)));
        assert!(default_retryable_error(&api_error(500)));
        assert!(!default_retryable_error(&api_error(403)));
        assert!(!default_retryable_error(&api_error(404)));
        assert!(!default_retryable_error(&api_error(405)));
    }
}
