//! Session admission policies
//!
//! Each device is built with one `SessionLock` that decides whether an open
//! request is admitted:
//!
//! | Policy         | Concurrent openers          | On contention            |
//! |----------------|-----------------------------|--------------------------|
//! | `Unrestricted` | any                         | never contended          |
//! | `Exclusive`    | one                         | `Busy`                   |
//! | `Owned`        | any, from the owning user   | `Busy`                   |
//! | `Queued`       | any, from the owning user   | wait, or `WouldBlock`    |
//!
//! The owner is the user that opened the device while nobody else had it
//! open. Ownership lapses when the open count returns to zero.
//!
//! Admission state has its own guard, separate from the store guard, and is
//! never held while waiting.

mod exclusive;
mod owned;
mod queued;

pub use exclusive::ExclusiveLock;
pub use owned::OwnedLock;
pub use queued::QueuedLock;

use crate::error::ScullError;
use crate::interrupt::Interrupt;

/// Identity of the caller, as supplied by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Real user id
    pub uid: u32,
    /// Effective user id
    pub euid: u32,
    /// Holds the capability that overrides ownership checks
    pub privileged: bool,
}

impl Credentials {
    /// Unprivileged user with `euid == uid`
    #[must_use]
    pub fn user(uid: u32) -> Self {
        Self {
            uid,
            euid: uid,
            privileged: false,
        }
    }

    #[must_use]
    pub fn with_euid(mut self, euid: u32) -> Self {
        self.euid = euid;
        self
    }

    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Whether these credentials may share a device owned by `owner`
    pub(crate) fn matches_owner(&self, owner: u32) -> bool {
        self.uid == owner || self.euid == owner || self.privileged
    }
}

/// Whether a contended open may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    #[default]
    Blocking,
    NonBlocking,
}

/// Selector for the admission policy of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Unrestricted,
    Exclusive,
    Owned,
    Queued,
}

/// Hook run after admission is decided and before it is recorded
///
/// If it fails, the open fails and no counter changes.
pub(crate) type AdmitHook<'a> = &'a (dyn Fn() -> Result<(), ScullError> + Sync);

/// Admission policy of one device
pub enum SessionLock {
    Unrestricted,
    Exclusive(ExclusiveLock),
    Owned(OwnedLock),
    Queued(QueuedLock),
}

impl SessionLock {
    #[must_use]
    pub fn policy(&self) -> Policy {
        match self {
            Self::Unrestricted => Policy::Unrestricted,
            Self::Exclusive(_) => Policy::Exclusive,
            Self::Owned(_) => Policy::Owned,
            Self::Queued(_) => Policy::Queued,
        }
    }

    /// Admit one session or fail
    ///
    /// Only the `Queued` policy may suspend, and only in `WaitMode::Blocking`.
    pub(crate) async fn acquire(
        &self,
        credentials: &Credentials,
        wait: WaitMode,
        interrupt: Option<&Interrupt>,
        on_admit: AdmitHook<'_>,
    ) -> Result<(), ScullError> {
        match self {
            Self::Unrestricted => on_admit(),
            Self::Exclusive(lock) => lock.acquire(on_admit),
            Self::Owned(lock) => lock.acquire(credentials, on_admit),
            Self::Queued(lock) => lock.acquire(credentials, wait, interrupt, on_admit).await,
        }
    }

    /// Give back one admitted session
    pub(crate) fn release(&self) {
        match self {
            Self::Unrestricted => {}
            Self::Exclusive(lock) => lock.release(),
            Self::Owned(lock) => {
                lock.release();
            }
            Self::Queued(lock) => lock.release(),
        }
    }

    /// Stop accepting waiters; blocked openers fail with `Interrupted`
    pub(crate) fn close(&self) {
        if let Self::Queued(lock) = self {
            lock.close();
        }
    }

    /// Number of sessions currently admitted
    ///
    /// Always 0 for `Unrestricted`, which keeps no count.
    #[must_use]
    pub fn open_count(&self) -> usize {
        match self {
            Self::Unrestricted => 0,
            Self::Exclusive(lock) => usize::from(lock.is_held()),
            Self::Owned(lock) => lock.open_count(),
            Self::Queued(lock) => lock.open_count(),
        }
    }

    /// Owning uid while the device is open under an ownership policy
    #[must_use]
    pub fn owner(&self) -> Option<u32> {
        match self {
            Self::Unrestricted | Self::Exclusive(_) => None,
            Self::Owned(lock) => lock.owner(),
            Self::Queued(lock) => lock.owner(),
        }
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SessionLock({:?}, open_count={}, owner={:?})",
            self.policy(),
            self.open_count(),
            self.owner()
        )
    }
}
