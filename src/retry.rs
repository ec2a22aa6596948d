use crate::api::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded exponential backoff with uniform jitter.
///
/// The wait after the `n`-th failed attempt (0-based) is
/// `min(base_delay * 2^n, max_delay) + uniform(0..=max_jitter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait following failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max))
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or runs out of attempts.
///
/// Exhaustion yields [`Error::RetriesExhausted`] carrying the last failure.
/// Both the operation and the waits between attempts are abandoned as soon
/// as `cancel` fires, yielding [`Error::Cancelled`].
pub async fn retry<T, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: C,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    C: Fn(&Error) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= max_attempts {
            log::warn!("giving up after {} attempts: {}", attempt, error);
            return Err(Error::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.backoff(attempt - 1) + policy.jitter();
        log::warn!(
            "attempt {}/{} failed: {}; retrying in {:?}",
            attempt,
            max_attempts,
            error,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::{retry, RetryPolicy};
    use crate::api::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn policy(max_attempts: u32, base_ms: u64, jitter_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(jitter_ms),
        }
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let p = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(Duration::from_secs(1), p.backoff(0));
        assert_eq!(Duration::from_secs(2), p.backoff(1));
        assert_eq!(Duration::from_secs(4), p.backoff(2));
        assert_eq!(Duration::from_secs(5), p.backoff(3));
        assert_eq!(Duration::from_secs(5), p.backoff(40));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = retry(&policy(5, 100, 50), &CancellationToken::new(), Error::is_transient, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(Error::Network("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(3, result.unwrap());
        assert_eq!(4, calls.load(Ordering::SeqCst));
        /* 100 + 200 + 400 ms, jitter only adds */
        assert!(started.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> =
            retry(&policy(5, 100, 0), &CancellationToken::new(), Error::is_transient, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Authentication("bad password".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_failure() {
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> =
            retry(&policy(3, 10, 0), &CancellationToken::new(), Error::is_transient, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(Error::Server(500 + n as u16, "boom".into())) }
            })
            .await;

        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(3, attempts);
                assert!(matches!(*last, Error::Server(502, _)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(3, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), Error> =
            retry(&policy(5, 60_000, 0), &cancel, Error::is_transient, || async {
                Err(Error::Network("unreachable".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
