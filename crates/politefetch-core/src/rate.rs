//! Minimum inter-departure spacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes departures so that consecutive `acquire` returns are at least
/// `min_delay` apart.
///
/// The lock is held across the check, the wait and the timestamp update, so
/// two waiters can never both observe "enough time has passed". Dropping an
/// `acquire` future mid-wait releases the lock without recording a departure.
#[derive(Debug)]
pub struct RateGovernor {
    min_delay: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RateGovernor {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_release: Mutex::new(None),
        }
    }

    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub async fn acquire(&self) {
        let mut last_release = self.last_release.lock().await;
        if let Some(previous) = *last_release {
            let ready_at = previous + self.min_delay;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_release = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let governor = RateGovernor::new(Duration::from_secs(5));
        let started = Instant::now();

        governor.acquire().await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_acquires_are_spaced() {
        let governor = RateGovernor::new(Duration::from_millis(200));
        let started = Instant::now();

        for _ in 0..4 {
            governor.acquire().await;
        }

        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_serialize() {
        let governor = std::sync::Arc::new(RateGovernor::new(Duration::from_millis(100)));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let governor = governor.clone();
            handles.push(tokio::spawn(async move {
                governor.acquire().await;
                Instant::now()
            }));
        }

        let mut releases = Vec::new();
        for handle in handles {
            releases.push(handle.await.expect("task should not panic"));
        }
        releases.sort();

        for pair in releases.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_counts_toward_the_delay() {
        let governor = RateGovernor::new(Duration::from_millis(100));
        governor.acquire().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let before = Instant::now();
        governor.acquire().await;

        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_does_not_record_a_departure() {
        let governor = RateGovernor::new(Duration::from_millis(100));
        governor.acquire().await;

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), governor.acquire()).await;
        assert!(abandoned.is_err());

        let before = Instant::now();
        governor.acquire().await;
        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(90) && waited < Duration::from_millis(100));
    }
}
