//! Caller-driven cancellation for in-progress fetches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation signal, optionally bounded by a deadline.
///
/// All clones observe the same signal. A token that is never cancelled and
/// has no deadline keeps `cancelled()` pending forever.
#[derive(Debug, Clone)]
pub struct CancelToken {
    signal: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            deadline: None,
        }
    }

    /// Token that trips on its own once `deadline` passes.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut receiver = self.signal.subscribe();
        let signalled = async move {
            // The sender lives in `self`, so the channel cannot close here.
            let _ = receiver.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signalled => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_seen_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();

        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn cancel_wakes_a_pending_waiter() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.cancel();

        waiter.await.expect("waiter should finish");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_trips_without_explicit_cancel() {
        let token = CancelToken::with_timeout(Duration::from_millis(300));
        let started = Instant::now();

        token.cancelled().await;

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn untouched_token_stays_pending() {
        let token = CancelToken::new();
        let outcome = tokio::time::timeout(Duration::from_secs(1), token.cancelled()).await;
        assert!(outcome.is_err());
    }
}
