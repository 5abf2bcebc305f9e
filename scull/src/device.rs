//! Devices and open sessions
//!
//! A `Device` pairs a `QuantumStore` with the `SessionLock` that guards who
//! may open it. `Device::open` yields a `DeviceHandle`, the per-session
//! state: a cursor plus a reference back to the device.
//!
//! # Thread Safety
//!
//! - The store sits behind the device's guard (`parking_lot::Mutex`). Every
//!   read, write, seek-to-end and trim takes it, so sessions on the same
//!   device are serialized; there are no concurrent readers.
//! - Admission state has its own guard inside the `SessionLock`. The store
//!   guard is never held while an open waits.
//! - `DeviceHandle` methods that move the cursor take `&mut self`; a handle
//!   is used from one task at a time.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::access::{Credentials, Policy, SessionLock, WaitMode};
use crate::error::ScullError;
use crate::idgen::{Handle, IdGen};
use crate::interrupt::Interrupt;
use crate::io::{QuantumStore, StoreStats};

/// Access mode requested at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Write-only opens truncate the device
    #[must_use]
    pub fn truncates(&self) -> bool {
        matches!(self, Self::WriteOnly)
    }
}

/// Target of a seek; the resulting offset must not be negative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(i64),
    Current(i64),
    /// Relative to the current size of the device
    End(i64),
}

/// Everything an open needs to know about the caller
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub access: AccessMode,
    pub credentials: Credentials,
    pub wait: WaitMode,
    /// Signal that aborts a blocking wait
    pub interrupt: Option<Interrupt>,
}

impl OpenRequest {
    /// Blocking, uninterruptible request
    #[must_use]
    pub fn new(access: AccessMode, credentials: Credentials) -> Self {
        Self {
            access,
            credentials,
            wait: WaitMode::Blocking,
            interrupt: None,
        }
    }

    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.wait = WaitMode::NonBlocking;
        self
    }

    #[must_use]
    pub fn interruptible(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }
}

/// One logical device: a store and its admission policy
pub struct Device {
    minor: Handle,
    name: String,
    store: Mutex<QuantumStore>,
    lock: SessionLock,
    sessions: IdGen,
}

impl Device {
    #[must_use]
    pub fn new(minor: Handle, name: &str, store: QuantumStore, lock: SessionLock) -> Self {
        Self {
            minor,
            name: name.to_string(),
            store: Mutex::new(store),
            lock,
            sessions: IdGen::new(),
        }
    }

    #[must_use]
    pub fn minor(&self) -> Handle {
        self.minor
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> Policy {
        self.lock.policy()
    }

    /// Sessions currently admitted (0 for unrestricted devices)
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock.open_count()
    }

    /// Owning uid while open under an ownership policy
    #[must_use]
    pub fn owner(&self) -> Option<u32> {
        self.lock.owner()
    }

    #[must_use]
    pub fn session_lock(&self) -> &SessionLock {
        &self.lock
    }

    /// Current end of data
    #[must_use]
    pub fn size(&self) -> u64 {
        self.store.lock().size()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }

    /// Free all data, independent of open sessions
    pub fn trim(&self) {
        self.store.lock().trim();
        debug!(device = %self.name, "trimmed");
    }

    /// Open a session
    ///
    /// Write-only opens trim the store once admitted. Only devices with the
    /// `Queued` policy ever wait, and only for blocking requests.
    ///
    /// # Errors
    ///
    /// - `Busy`: refused by an `Exclusive` or `Owned` policy
    /// - `WouldBlock`: contended `Queued` device and a non-blocking request
    /// - `Interrupted`: the wait was interrupted or the device was closed
    pub async fn open(self: &Arc<Self>, request: OpenRequest) -> Result<DeviceHandle, ScullError> {
        let truncate = request.access.truncates();
        let on_admit = || -> Result<(), ScullError> {
            if truncate {
                self.store.lock().trim();
            }
            Ok(())
        };

        if let Err(e) = self
            .lock
            .acquire(
                &request.credentials,
                request.wait,
                request.interrupt.as_ref(),
                &on_admit,
            )
            .await
        {
            debug!(device = %self.name, uid = request.credentials.uid, error = %e, "open refused");
            return Err(e);
        }

        let id = self.sessions.next_handle();
        debug!(
            device = %self.name,
            session = %id,
            uid = request.credentials.uid,
            access = ?request.access,
            "opened"
        );
        Ok(DeviceHandle {
            id,
            device: Arc::clone(self),
            access: request.access,
            pos: 0,
            released: false,
        })
    }

    /// Refuse future waits and fail pending ones, then free all data
    pub(crate) fn close(&self) {
        self.lock.close();
        self.trim();
    }

    fn read_at(&self, offset: i64, buf: &mut [u8]) -> Result<usize, ScullError> {
        let offset = u64::try_from(offset).map_err(|_| ScullError::InvalidArgument)?;
        Ok(self.store.lock().read(offset, buf))
    }

    fn write_at(&self, offset: i64, data: &[u8]) -> Result<usize, ScullError> {
        let offset = u64::try_from(offset).map_err(|_| ScullError::InvalidArgument)?;
        Ok(self.store.lock().write(offset, data)?)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device(minor={:?}, name={}, lock={:?}, store={:?})",
            self.minor,
            self.name,
            self.lock,
            self.store.lock()
        )
    }
}

/// An open session on a device
///
/// Releasing is idempotent; dropping an unreleased handle releases it.
/// After release every I/O call fails with `InvalidArgument`.
pub struct DeviceHandle {
    id: Handle,
    device: Arc<Device>,
    access: AccessMode,
    pos: i64,
    released: bool,
}

impl DeviceHandle {
    #[must_use]
    pub fn id(&self) -> Handle {
        self.id
    }

    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[must_use]
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Current cursor position
    #[must_use]
    pub fn tell(&self) -> i64 {
        self.pos
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn check_open(&self) -> Result<(), ScullError> {
        if self.released {
            warn!(device = %self.device.name, session = %self.id, "use after release");
            return Err(ScullError::InvalidArgument);
        }
        Ok(())
    }

    /// Read at the cursor and advance it
    ///
    /// Returns fewer bytes than `buf.len()` at a quantum boundary, and 0 at
    /// end of data or inside a hole.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the handle was released.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScullError> {
        let n = self.read_at(self.pos, buf)?;
        self.advance(n);
        Ok(n)
    }

    /// Read at `offset` without moving the cursor
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the handle was released or `offset` is negative.
    pub fn read_at(&self, offset: i64, buf: &mut [u8]) -> Result<usize, ScullError> {
        self.check_open()?;
        let n = self.device.read_at(offset, buf)?;
        trace!(session = %self.id, offset, bytes = n, "read");
        Ok(n)
    }

    /// Write at the cursor and advance it
    ///
    /// Writes at most up to the end of the current quantum.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if backing memory cannot be allocated,
    /// `InvalidArgument` if the handle was released.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, ScullError> {
        let n = self.write_at(self.pos, data)?;
        self.advance(n);
        Ok(n)
    }

    /// Write at `offset` without moving the cursor
    ///
    /// # Errors
    ///
    /// See `write`; also `InvalidArgument` for a negative `offset`.
    pub fn write_at(&self, offset: i64, data: &[u8]) -> Result<usize, ScullError> {
        self.check_open()?;
        let n = self.device.write_at(offset, data)?;
        trace!(session = %self.id, offset, bytes = n, "write");
        Ok(n)
    }

    /// Move the cursor; may go past the end of data
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the target is negative or overflows, or if the
    /// handle was released.
    pub fn seek(&mut self, target: SeekFrom) -> Result<i64, ScullError> {
        self.check_open()?;
        let new_pos = match target {
            SeekFrom::Start(delta) => Some(delta),
            SeekFrom::Current(delta) => self.pos.checked_add(delta),
            SeekFrom::End(delta) => i64::try_from(self.device.size())
                .ok()
                .and_then(|size| size.checked_add(delta)),
        };

        match new_pos {
            Some(pos) if pos >= 0 => {
                self.pos = pos;
                Ok(pos)
            }
            _ => Err(ScullError::InvalidArgument),
        }
    }

    /// End the session
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.device.lock.release();
        debug!(device = %self.device.name, session = %self.id, "released");
    }

    #[allow(clippy::cast_possible_wrap)]
    fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n as i64);
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceHandle(id={:?}, device={}, access={:?}, pos={}, released={})",
            self.id, self.device.name, self.access, self.pos, self.released
        )
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            self.release();
        }
    }
}
