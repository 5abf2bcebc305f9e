//! Cancellation signal for blocking opens
//!
//! Stands in for a user interrupt delivered to a sleeping caller. Raising it
//! aborts a suspended open with `ScullError::Interrupted`.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable interrupt flag; clones share the same signal
#[derive(Debug, Clone)]
pub struct Interrupt {
    signal: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    /// Raise the interrupt, waking every wait that observes it
    pub fn raise(&self) {
        self.signal.send_replace(true);
    }

    /// Lower the interrupt so the signal can be reused
    pub fn clear(&self) {
        self.signal.send_replace(false);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolve once the interrupt is raised; immediately if it already is
    pub async fn raised(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raised_resolves_after_raise() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();

        let waiter = tokio::spawn(async move { clone.raised().await });
        tokio::task::yield_now().await;
        assert!(!interrupt.is_raised());

        interrupt.raise();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("interrupt not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_already_raised_resolves_immediately() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        interrupt.raised().await;

        interrupt.clear();
        assert!(!interrupt.is_raised());
    }
}
