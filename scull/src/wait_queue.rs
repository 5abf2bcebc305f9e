//! Wait queue for blocked openers
//!
//! Openers that cannot be admitted yet park here under their device's
//! handle. A release that frees the device wakes every parked opener, and
//! each one re-checks admission for itself.
//!
//! # Lost wake-ups
//!
//! The workflow of a blocked opener:
//!
//! 10. Opener: check admission, fails
//! 20. Opener: register in the waiting list
//! 30. Opener: wait for the wake-up
//!
//! and of a releaser:
//!
//! 40. Releaser: decrement the open count to zero
//! 50. Releaser: take all openers from the waiting list and wake them
//!
//! If 40-50 run between 10 and 20, the opener registers after the wake-up
//! and sleeps forever although the device is free. To prevent this, the
//! opener holds the queue lock across 10-20:
//!
//! ```ignore
//! let wait = {
//!     let lock = queue.get_lock();
//!     if try_admit() {
//!         return Ok(());
//!     }
//!     queue.wait_async(handle, debug_hint, lock)
//!     // lock is consumed by wait_async and released before awaiting
//! };
//! wait.await;
//! ```
//!
//! The releaser only needs the queue lock for step 50, which then cannot
//! interleave with 10-20.
//!
//! # Unlisting
//!
//! Only whitelisted handles can be waited on. `unlist` wakes every waiter
//! with `UNLISTED`, and waiting on a handle that is not whitelisted resolves
//! immediately with `UNLISTED`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::idgen::{Handle, IntCanBeHandle};

/// Wake-up value delivered when a handle is removed from the queue
pub const UNLISTED: IntCanBeHandle = -1;

/// A parked opener
struct WaitingClient {
    /// `tokio::sync::oneshot::Sender` is `Send`, so any thread may wake the client
    sender: tokio::sync::oneshot::Sender<IntCanBeHandle>,
    debug_hint: String,
}

impl std::fmt::Debug for WaitingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingClient")
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

pub(crate) struct InnerState {
    whitelist: HashMap<Handle, String>,
    waiting_clients: HashMap<Handle, Vec<WaitingClient>>,
}

impl InnerState {
    fn new() -> Self {
        Self {
            whitelist: HashMap::new(),
            waiting_clients: HashMap::new(),
        }
    }

    fn prune(&mut self, handle: Handle) {
        if let Some(waiters) = self.waiting_clients.get_mut(&handle) {
            let before = waiters.len();
            waiters.retain(|w| !w.sender.is_closed());
            if waiters.len() != before {
                log::debug!(
                    "queue.prune: handle {:?}, dropped {} abandoned waiters",
                    handle,
                    before - waiters.len()
                );
            }
            if waiters.is_empty() {
                self.waiting_clients.remove(&handle);
            }
        }
    }
}

/// Thread-safe wait queue keyed by device handle
///
/// Clones share the same queue.
#[derive(Clone)]
pub struct WaitQueue {
    inner: Arc<Mutex<InnerState>>,
}

impl WaitQueue {
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerState::new())),
        }
    }

    /// Get the lock for atomic admission-check + register operations
    pub(crate) fn get_lock(&self) -> parking_lot::MutexGuard<'_, InnerState> {
        self.inner.lock()
    }

    /// Register a handle in the whitelist
    pub fn whitelist(&self, handle: Handle, debug_hint: &str) {
        let mut state = self.inner.lock();
        if let Some(old_hint) = state.whitelist.insert(handle, debug_hint.to_string()) {
            log::warn!("queue.whitelist: handle {handle:?} already in whitelist (was: '{old_hint}')");
        }
    }

    /// Whether waiting on `handle` is possible
    #[must_use]
    pub fn is_listed(&self, handle: Handle) -> bool {
        self.inner.lock().whitelist.contains_key(&handle)
    }

    /// Unregister a handle and wake all its waiters with `UNLISTED`
    pub fn unlist(&self, handle: Handle) {
        let mut state = self.inner.lock();
        if state.whitelist.remove(&handle).is_none() {
            log::warn!("queue.unlist: handle {handle:?} not in whitelist");
        }
        drop(state);

        self.notify(handle, UNLISTED);
    }

    /// Number of clients currently parked on `handle`
    ///
    /// Clients that stopped waiting without being notified are not counted.
    #[must_use]
    pub fn waiter_count(&self, handle: Handle) -> usize {
        self.inner
            .lock()
            .waiting_clients
            .get(&handle)
            .map_or(0, |waiters| {
                waiters.iter().filter(|w| !w.sender.is_closed()).count()
            })
    }

    /// Registrations on `handle`, abandoned ones included
    #[cfg(test)]
    pub(crate) fn registered(&self, handle: Handle) -> usize {
        self.inner
            .lock()
            .waiting_clients
            .get(&handle)
            .map_or(0, Vec::len)
    }

    /// Drop the registrations on `handle` whose waiter has gone away
    pub(crate) fn prune(&self, handle: Handle) {
        let mut state = self.inner.lock();
        state.prune(handle);
    }

    /// Wake every client parked on `handle`
    pub fn notify(&self, handle: Handle, arg: IntCanBeHandle) {
        let mut state = self.inner.lock();
        let waiters = state.waiting_clients.remove(&handle).unwrap_or_default();
        drop(state);

        log::debug!(
            "queue.notify: handle {:?}, arg={}, waiters: {}",
            handle,
            arg,
            waiters.len()
        );

        for waiter in waiters {
            if waiter.sender.send(arg).is_err() {
                // The waiter gave up, e.g. it was interrupted
                log::debug!(
                    "queue.notify: receiver dropped for handle {:?} (hint: {})",
                    handle,
                    waiter.debug_hint
                );
            }
        }
    }

    /// Park on `handle` until notified
    ///
    /// Precondition: the caller acquired the lock with `get_lock` and checked
    /// its condition while holding it.
    /// Post-condition: the lock is released when this method returns; the
    /// returned future does not hold it.
    ///
    /// The future resolves to the notification value, or to `UNLISTED` if the
    /// handle is (or becomes) unlisted.
    pub(crate) fn wait_async(
        &self,
        handle: Handle,
        debug_hint: &str,
        mut lock: parking_lot::MutexGuard<'_, InnerState>,
    ) -> impl std::future::Future<Output = IntCanBeHandle> + Send {
        let (tx, rx) = tokio::sync::oneshot::channel();

        #[allow(clippy::if_not_else)]
        if !lock.whitelist.contains_key(&handle) {
            drop(lock);
            let _ = tx.send(UNLISTED);
        } else {
            let client = WaitingClient {
                sender: tx,
                debug_hint: debug_hint.to_string(),
            };
            lock.prune(handle);
            lock.waiting_clients.entry(handle).or_default().push(client);
            drop(lock);
        }

        // A dropped sender without a value only happens if the whole queue is
        // dropped while clients wait; treat it like unlisting.
        async move { rx.await.unwrap_or(UNLISTED) }
    }
}

impl std::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("WaitQueue")
            .field("whitelist", &state.whitelist)
            .field("waiting_clients", &state.waiting_clients)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_then_notify() {
        let queue = WaitQueue::new();
        let handle = Handle::new(1);
        queue.whitelist(handle, "test");

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let queue_clone = queue.clone();
        let waiter = tokio::spawn(async move {
            let wait = {
                let lock = queue_clone.get_lock();
                queue_clone.wait_async(handle, "waiter", lock)
            };
            ready_tx.send(()).unwrap();
            wait.await
        });

        ready_rx.await.unwrap();
        assert_eq!(queue.waiter_count(handle), 1);
        queue.notify(handle, 0);

        assert_eq!(waiter.await.unwrap(), 0);
        assert_eq!(queue.waiter_count(handle), 0);
    }

    #[tokio::test]
    async fn test_wait_on_unlisted_handle_resolves_immediately() {
        let queue = WaitQueue::new();
        let handle = Handle::new(2);

        let lock = queue.get_lock();
        assert_eq!(queue.wait_async(handle, "waiter", lock).await, UNLISTED);
    }

    #[tokio::test]
    async fn test_unlist_wakes_waiters() {
        let queue = WaitQueue::new();
        let handle = Handle::new(3);
        queue.whitelist(handle, "test");

        let wait = {
            let lock = queue.get_lock();
            queue.wait_async(handle, "waiter", lock)
        };
        queue.unlist(handle);

        assert_eq!(wait.await, UNLISTED);
        assert!(!queue.is_listed(handle));
    }

    #[tokio::test]
    async fn test_notify_only_wakes_own_handle() {
        let queue = WaitQueue::new();
        let first = Handle::new(4);
        let second = Handle::new(5);
        queue.whitelist(first, "first");
        queue.whitelist(second, "second");

        let wait = {
            let lock = queue.get_lock();
            queue.wait_async(first, "waiter", lock)
        };
        queue.notify(second, 0);
        assert_eq!(queue.waiter_count(first), 1);

        queue.notify(first, 7);
        assert_eq!(wait.await, 7);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_not_counted_and_pruned() {
        let queue = WaitQueue::new();
        let handle = Handle::new(6);
        queue.whitelist(handle, "test");

        let abandoned = {
            let lock = queue.get_lock();
            queue.wait_async(handle, "abandoned", lock)
        };
        let kept = {
            let lock = queue.get_lock();
            queue.wait_async(handle, "kept", lock)
        };
        assert_eq!(queue.waiter_count(handle), 2);

        drop(abandoned);
        assert_eq!(queue.waiter_count(handle), 1);

        queue.prune(handle);
        assert_eq!(queue.registered(handle), 1);

        queue.notify(handle, 3);
        assert_eq!(kept.await, 3);
    }
}
