//! Single-owner policy with waiting instead of refusal

use super::owned::OwnedLock;
use super::{AdmitHook, Credentials, WaitMode};
use crate::error::ScullError;
use crate::idgen::Handle;
use crate::interrupt::Interrupt;
use crate::wait_queue::{WaitQueue, UNLISTED};

/// Same admission rule as `OwnedLock`, but contended blocking openers wait
/// until the device is released by everyone
///
/// Waiters are parked in the wait queue under the device's handle and woken
/// all at once when the open count drops to exactly zero. Each re-checks
/// admission after waking; the first to get through becomes the new owner.
pub struct QueuedLock {
    owned: OwnedLock,
    queue: WaitQueue,
    handle: Handle,
}

impl QueuedLock {
    /// Create the lock and whitelist `handle` in `queue`
    #[must_use]
    pub fn new(handle: Handle, queue: WaitQueue, debug_hint: &str) -> Self {
        queue.whitelist(handle, debug_hint);
        Self {
            owned: OwnedLock::new(),
            queue,
            handle,
        }
    }

    pub(crate) async fn acquire(
        &self,
        credentials: &Credentials,
        wait: WaitMode,
        interrupt: Option<&Interrupt>,
        on_admit: AdmitHook<'_>,
    ) -> Result<(), ScullError> {
        loop {
            // Check and register under the queue lock, see `crate::wait_queue`
            let woken = {
                let queue_lock = self.queue.get_lock();
                if self.owned.try_acquire(credentials, on_admit)? {
                    return Ok(());
                }
                if wait == WaitMode::NonBlocking {
                    return Err(ScullError::WouldBlock);
                }
                log::debug!(
                    "queued.acquire: uid {} waits on {:?}",
                    credentials.uid,
                    self.handle
                );
                self.queue.wait_async(self.handle, "queued.open", queue_lock)
            };

            let signal = match interrupt {
                Some(interrupt) => {
                    tokio::select! {
                        biased;
                        () = interrupt.raised() => None,
                        signal = woken => Some(signal),
                    }
                }
                None => Some(woken.await),
            };

            // `woken` is consumed by `select!`, its receiver is already dropped
            let Some(signal) = signal else {
                self.queue.prune(self.handle);
                log::debug!("queued.acquire: uid {} interrupted", credentials.uid);
                return Err(ScullError::Interrupted);
            };

            if signal == UNLISTED {
                log::debug!("queued.acquire: {:?} closed while waiting", self.handle);
                return Err(ScullError::Interrupted);
            }
        }
    }

    /// Drop one session; wakes the waiters when the count reaches zero
    pub(crate) fn release(&self) {
        if self.owned.release() == 0 {
            self.queue.notify(self.handle, 0);
        }
    }

    /// Unlist from the wait queue, failing every pending and future wait
    pub(crate) fn close(&self) {
        if self.queue.is_listed(self.handle) {
            self.queue.unlist(self.handle);
        }
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.owned.open_count()
    }

    #[must_use]
    pub fn owner(&self) -> Option<u32> {
        self.owned.owner()
    }

    /// Number of openers currently waiting
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.queue.waiter_count(self.handle)
    }
}

impl Drop for QueuedLock {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for QueuedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QueuedLock(handle={:?}, open_count={}, owner={:?}, waiting={})",
            self.handle,
            self.open_count(),
            self.owner(),
            self.waiting()
        )
    }
}
