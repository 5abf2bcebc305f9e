//! Single-open policy

use std::sync::atomic::{AtomicBool, Ordering};

use super::AdmitHook;
use crate::error::ScullError;

/// Admits one session at a time; losers fail with `Busy` and never wait
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    held: AtomicBool,
}

impl ExclusiveLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acquire(&self, on_admit: AdmitHook<'_>) -> Result<(), ScullError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("exclusive.acquire: already held");
            return Err(ScullError::Busy);
        }

        if let Err(e) = on_admit() {
            self.held.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Result<(), ScullError> {
        Ok(())
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let lock = ExclusiveLock::new();
        lock.acquire(&ok).unwrap();
        assert_eq!(lock.acquire(&ok), Err(ScullError::Busy));

        lock.release();
        assert!(!lock.is_held());
        lock.acquire(&ok).unwrap();
    }

    #[test]
    fn test_failed_hook_frees_lock() {
        let lock = ExclusiveLock::new();
        let fail = || -> Result<(), ScullError> { Err(ScullError::OutOfMemory) };
        assert_eq!(lock.acquire(&fail), Err(ScullError::OutOfMemory));
        assert!(!lock.is_held());
    }

    #[test]
    fn test_contended_from_threads() {
        let lock = std::sync::Arc::new(ExclusiveLock::new());
        let winners: usize = (0..8)
            .map(|_| {
                let lock = std::sync::Arc::clone(&lock);
                std::thread::spawn(move || lock.acquire(&ok).is_ok())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| usize::from(t.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }
}
