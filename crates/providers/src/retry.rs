//! Retry-with-backoff for provider calls (§4.3).
//!
//! The teacher has no retry analog for a single provider call — it falls
//! back across distinct configured models instead of retrying one — so
//! this is built fresh on the `backoff` crate, the same crate named in the
//! retrieval pack's `OpenTech-Lab-openagent` reference manifest.
//! `backoff::ExponentialBackoffBuilder` has no attempt ceiling of its own
//! (only elapsed-time), so the 10-attempt default from §6 is enforced by
//! the loop here, on top of the library's delay schedule.
//!
//! Applies only before the first token of a response is produced;
//! streaming callers stop retrying the moment `sink.on_token` has fired
//! once (enforced at the call site, not here, since this helper has no
//! visibility into the sink).

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

use lace_domain::config::RetryConfig;
use lace_domain::error::LaceError;

/// One observed retry attempt, mirroring the `retry_attempt{attempt, delay,
/// error}` observable event from §4.3.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Per-turn retry accounting, folded into `TurnMetrics.retryMetrics`.
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub attempts: u32,
    pub total_delay_ms: u64,
    pub successful: bool,
    pub last_error: Option<String>,
}

/// Run `f` with exponential backoff, retrying only on
/// [`LaceError::is_retriable`] errors, up to `config.max_attempts` total
/// attempts. `on_attempt` is called once per *retry* (not the first try)
/// so observers see exactly the `retry_attempt` events the spec names.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut on_attempt: impl FnMut(RetryAttempt),
    mut f: F,
) -> (Result<T, LaceError>, RetryMetrics)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LaceError>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_delay_ms))
        .with_max_interval(Duration::from_millis(config.max_delay_ms))
        .with_max_elapsed_time(None)
        .build();

    let mut metrics = RetryMetrics::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                metrics.attempts = attempt - 1;
                metrics.successful = true;
                return (Ok(value), metrics);
            }
            Err(err) => {
                let retriable = err.is_retriable();
                if !retriable || attempt >= config.max_attempts {
                    metrics.attempts = attempt - 1;
                    metrics.successful = false;
                    metrics.last_error = Some(err.to_string());
                    return (Err(err), metrics);
                }

                let delay = backoff.next_backoff().unwrap_or(Duration::from_millis(config.max_delay_ms));
                metrics.total_delay_ms += delay.as_millis() as u64;
                metrics.last_error = Some(err.to_string());

                on_attempt(RetryAttempt {
                    attempt,
                    delay,
                    error: err.to_string(),
                });

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            max_attempts: 5,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let (result, metrics) = with_retry(
            &fast_config(),
            |_| panic!("should not retry"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, LaceError>(42) }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(metrics.attempts, 0);
        assert!(metrics.successful);
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let mut seen_attempts = Vec::new();
        let (result, metrics) = with_retry(
            &fast_config(),
            |a| seen_attempts.push(a.attempt),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LaceError::ProviderTransient("503".into()))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(metrics.attempts, 2);
        assert!(metrics.successful);
        assert_eq!(seen_attempts, vec![1, 2]);
    }

    #[tokio::test]
    async fn does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let (result, metrics) = with_retry(
            &fast_config(),
            |_| panic!("fatal errors must not retry"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LaceError::ProviderFatal("401".into())) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!metrics.successful);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            max_attempts: 3,
        };
        let (result, metrics) = with_retry(
            &config,
            |_| {},
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(LaceError::ProviderTransient("503".into())) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.attempts, 2);
    }
}
