//! Bounded admission for in-flight transport calls.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting gate initialised with `max_concurrent_requests` permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the duration of one attempt; the slot frees when this drops.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot. Fails only if the underlying semaphore closed.
    pub async fn admit(&self) -> Result<GatePermit, AcquireError> {
        let permit = self.permits.clone().acquire_owned().await?;
        Ok(GatePermit { _permit: permit })
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let gate = ConcurrencyGate::new(2);

        let first = gate.admit().await.expect("gate open");
        let second = gate.admit().await.expect("gate open");
        assert_eq!(gate.in_use(), 2);

        drop(first);
        assert_eq!(gate.available(), 1);
        drop(second);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_waits_when_exhausted() {
        let gate = ConcurrencyGate::new(1);
        let held = gate.admit().await.expect("gate open");

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.admit()).await;
        assert!(blocked.is_err(), "second admit must wait while the slot is held");

        drop(held);
        let admitted = tokio::time::timeout(Duration::from_millis(50), gate.admit()).await;
        assert!(admitted.is_ok());
    }
}
