//! Polling helper for waiting on eventually-consistent cluster state

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::Error;

/// Outcome of a polling loop that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The check reported the condition as met
    Met,
    /// The cancellation token fired before the condition was met
    Cancelled,
}

/// Poll until a condition is met, the timeout elapses, or the token is cancelled
///
/// The check runs immediately and then once per `poll_interval`. `Ok(false)`
/// and `Err` both mean "not yet": errors are logged at trace level and the
/// check is retried on the next tick. On timeout the error message is built
/// by `timeout_msg`, so it can describe whatever is still pending.
pub async fn poll_until<F, Fut, M>(
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
    timeout_msg: M,
    mut check_fn: F,
) -> Result<PollOutcome, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
    M: FnOnce() -> String,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match check_fn().await {
            Ok(true) => return Ok(PollOutcome::Met),
            Ok(false) => trace!("Polling condition not yet met, retrying..."),
            Err(e) => trace!(error = %e, "Polling check returned error (retrying)"),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::timeout("poll_until", timeout_msg()));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_met_after_a_few_polls() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll_until(
            Duration::from_secs(10),
            Duration::from_secs(1),
            &CancellationToken::new(),
            || "never".to_string(),
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Met);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll_until(
            Duration::from_secs(10),
            Duration::from_secs(1),
            &CancellationToken::new(),
            || "never".to_string(),
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::internal("transient"))
                    } else {
                        Ok(true)
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Met);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_message() {
        let err = poll_until(
            Duration::from_secs(3),
            Duration::from_secs(1),
            &CancellationToken::new(),
            || "still waiting on Pod/default/web".to_string(),
            || async { Ok(false) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.to_string().contains("Pod/default/web"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = poll_until(
            Duration::from_secs(60),
            Duration::from_secs(1),
            &cancel,
            || "never".to_string(),
            || async { Ok(false) },
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
    }
}
