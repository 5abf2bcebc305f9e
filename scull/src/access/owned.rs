//! Single-owner policy: many sessions, one user

use parking_lot::Mutex;

use super::{AdmitHook, Credentials};
use crate::error::ScullError;

/// Admission state shared by the owner-based policies
#[derive(Debug, Default)]
struct Occupancy {
    count: usize,
    /// Meaningful only while `count > 0`
    owner: u32,
}

impl Occupancy {
    fn admits(&self, credentials: &Credentials) -> bool {
        self.count == 0 || credentials.matches_owner(self.owner)
    }

    fn admit(&mut self, credentials: &Credentials) {
        if self.count == 0 {
            self.owner = credentials.uid;
        }
        self.count += 1;
    }
}

/// Admits any number of sessions as long as they come from the owner
///
/// The first opener of an idle device becomes its owner. Others are refused
/// with `Busy` unless they are privileged.
#[derive(Debug, Default)]
pub struct OwnedLock {
    state: Mutex<Occupancy>,
}

impl OwnedLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit if possible; `Ok(false)` means contended
    ///
    /// `on_admit` runs under the guard after the decision and before the
    /// count changes, so a failing hook leaves no phantom session.
    pub(crate) fn try_acquire(
        &self,
        credentials: &Credentials,
        on_admit: AdmitHook<'_>,
    ) -> Result<bool, ScullError> {
        let mut state = self.state.lock();
        if !state.admits(credentials) {
            log::debug!(
                "owned.acquire: uid {} refused, owned by {} ({} open)",
                credentials.uid,
                state.owner,
                state.count
            );
            return Ok(false);
        }
        on_admit()?;
        state.admit(credentials);
        Ok(true)
    }

    pub(crate) fn acquire(
        &self,
        credentials: &Credentials,
        on_admit: AdmitHook<'_>,
    ) -> Result<(), ScullError> {
        if self.try_acquire(credentials, on_admit)? {
            Ok(())
        } else {
            Err(ScullError::Busy)
        }
    }

    /// Drop one session; returns the sessions still open
    pub(crate) fn release(&self) -> usize {
        let mut state = self.state.lock();
        if state.count == 0 {
            log::warn!("owned.release: released with no open sessions");
            return 0;
        }
        state.count -= 1;
        state.count
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().count
    }

    /// Owning uid, or `None` when nobody has the device open
    #[must_use]
    pub fn owner(&self) -> Option<u32> {
        let state = self.state.lock();
        (state.count > 0).then_some(state.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Result<(), ScullError> {
        Ok(())
    }

    #[test]
    fn test_first_opener_becomes_owner() {
        let lock = OwnedLock::new();
        lock.acquire(&Credentials::user(5), &ok).unwrap();
        assert_eq!(lock.owner(), Some(5));
        assert_eq!(lock.open_count(), 1);
    }

    #[test]
    fn test_other_user_refused() {
        let lock = OwnedLock::new();
        lock.acquire(&Credentials::user(5), &ok).unwrap();
        assert_eq!(
            lock.acquire(&Credentials::user(6), &ok),
            Err(ScullError::Busy)
        );
        assert_eq!(lock.open_count(), 1);
    }

    #[test]
    fn test_failed_hook_leaves_state_unchanged() {
        let lock = OwnedLock::new();
        let fail = || -> Result<(), ScullError> { Err(ScullError::OutOfMemory) };
        assert_eq!(
            lock.acquire(&Credentials::user(5), &fail),
            Err(ScullError::OutOfMemory)
        );
        assert_eq!(lock.open_count(), 0);
        assert_eq!(lock.owner(), None);
    }

    #[test]
    fn test_extra_release_does_not_underflow() {
        let lock = OwnedLock::new();
        assert_eq!(lock.release(), 0);
        assert_eq!(lock.open_count(), 0);
    }

    #[test]
    fn test_privileged_first_opener_becomes_owner() {
        let lock = OwnedLock::new();
        lock.acquire(&Credentials::user(0).privileged(), &ok).unwrap();
        assert_eq!(lock.owner(), Some(0));

        lock.acquire(&Credentials::user(7).privileged(), &ok).unwrap();
        assert_eq!(lock.owner(), Some(0));
        assert_eq!(lock.open_count(), 2);
    }
}
