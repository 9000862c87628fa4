//! Cancellation- and timeout-aware awaiting for suspension points.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of racing a future against cancellation and an optional timeout.
pub(crate) enum Controlled<T> {
    Value(T),
    Cancelled,
    TimedOut(u64),
}

/// Await `fut`, aborting at the nearest poll if the token fires or the
/// timeout elapses. Model and tool calls are the only places this wraps;
/// everything else in a turn is non-blocking.
pub(crate) async fn await_controlled<F: Future>(
    cancellation: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Controlled<F::Output> {
    let work = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(value) => Controlled::Value(value),
                Err(_) => Controlled::TimedOut(limit.as_millis() as u64),
            },
            None => Controlled::Value(fut.await),
        }
    };
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Controlled::Cancelled,
        outcome = work => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn value_passes_through() {
        let token = CancellationToken::new();
        match await_controlled(&token, None, async { 7 }).await {
            Controlled::Value(v) => assert_eq!(v, 7),
            _ => panic!("expected value"),
        }
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_work() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome = await_controlled(&token, None, std::future::pending::<()>()).await;
        assert!(matches!(outcome, Controlled::Cancelled));
    }

    #[tokio::test]
    async fn timeout_fires_on_slow_work() {
        let token = CancellationToken::new();
        let outcome = await_controlled(
            &token,
            Some(Duration::from_millis(5)),
            std::future::pending::<()>(),
        )
        .await;
        assert!(matches!(outcome, Controlled::TimedOut(5)));
    }
}
