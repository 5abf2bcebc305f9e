//! DeviceRegistry - the table of devices
//!
//! Creation order: defaults, wait queue, then one store per device. The
//! plain devices `scull0..scull{nr_devs-1}` come first, followed by one
//! device per access policy:
//!
//! | Name          | Policy      |
//! |---------------|-------------|
//! | `scull{i}`    | Unrestricted|
//! | `scullsingle` | Exclusive   |
//! | `sculluid`    | Owned       |
//! | `scullwuid`   | Queued      |
//!
//! Minor numbers are assigned in that order starting at 0.
//!
//! Teardown (`shutdown`, also run on drop) closes every device: blocked
//! openers are woken with `Interrupted`, each store is trimmed, then the
//! table is emptied. Open handles keep their device alive but find it empty.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::access::{ExclusiveLock, OwnedLock, Policy, QueuedLock, SessionLock};
use crate::device::Device;
use crate::idgen::Handle;
use crate::io::QuantumStore;
use crate::params::{Defaults, Params};
use crate::wait_queue::WaitQueue;

/// Name of the single-open device
pub const SINGLE_NAME: &str = "scullsingle";
/// Name of the single-owner device
pub const UID_NAME: &str = "sculluid";
/// Name of the waiting single-owner device
pub const WUID_NAME: &str = "scullwuid";

/// Table of devices, indexed by minor number
///
/// Uses interior mutability so it can be shared through `Arc<DeviceRegistry>`.
pub struct DeviceRegistry {
    devices: Mutex<Vec<Arc<Device>>>,
    defaults: Defaults,
    queue: WaitQueue,
    params: Params,
}

impl DeviceRegistry {
    /// Create every device described by `params`
    #[must_use]
    pub fn new(params: Params) -> Self {
        let defaults = Defaults::new(params.geometry);
        let queue = WaitQueue::new();

        let mut layout: Vec<(String, Policy)> = (0..params.nr_devs)
            .map(|i| (format!("scull{i}"), Policy::Unrestricted))
            .collect();
        layout.push((SINGLE_NAME.to_string(), Policy::Exclusive));
        layout.push((UID_NAME.to_string(), Policy::Owned));
        layout.push((WUID_NAME.to_string(), Policy::Queued));

        let devices = layout
            .into_iter()
            .enumerate()
            .map(|(minor, (name, policy))| {
                #[allow(clippy::cast_possible_wrap)]
                let minor = Handle::new(minor as i64);
                let lock = match policy {
                    Policy::Unrestricted => SessionLock::Unrestricted,
                    Policy::Exclusive => SessionLock::Exclusive(ExclusiveLock::new()),
                    Policy::Owned => SessionLock::Owned(OwnedLock::new()),
                    Policy::Queued => SessionLock::Queued(QueuedLock::new(minor, queue.clone(), &name)),
                };
                let store = QuantumStore::new(defaults.clone(), params.limits);
                debug!(device = %name, minor = %minor, policy = ?policy, "device created");
                Arc::new(Device::new(minor, &name, store, lock))
            })
            .collect::<Vec<_>>();

        info!(
            devices = devices.len(),
            quantum = params.geometry.quantum(),
            qset = params.geometry.qset(),
            "registry ready"
        );

        Self {
            devices: Mutex::new(devices),
            defaults,
            queue,
            params,
        }
    }

    /// Parameters the registry was built with
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Live default geometry; stores pick up changes on their next trim
    #[must_use]
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Wait queue shared by the `Queued` devices
    #[must_use]
    pub fn wait_queue(&self) -> &WaitQueue {
        &self.queue
    }

    /// Device by minor number
    #[must_use]
    pub fn device(&self, minor: Handle) -> Option<Arc<Device>> {
        let devices = self.devices.lock();
        usize::try_from(minor.id())
            .ok()
            .and_then(|index| devices.get(index))
            .cloned()
    }

    /// Device by name
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<Device>> {
        let devices = self.devices.lock();
        devices.iter().find(|d| d.name() == name).cloned()
    }

    /// Snapshot of all devices in minor order
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Close and trim every device, then empty the table
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let devices = std::mem::take(&mut *self.devices.lock());
        if devices.is_empty() {
            return;
        }
        // Close outside the table lock: closing wakes waiters
        for device in &devices {
            device.close();
        }
        info!(devices = devices.len(), "registry shut down");
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("params", &self.params)
            .field("devices", &self.devices.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let registry = DeviceRegistry::new(Params {
            nr_devs: 2,
            ..Params::default()
        });

        let names: Vec<String> = registry
            .devices()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["scull0", "scull1", "scullsingle", "sculluid", "scullwuid"]
        );

        let wuid = registry.device(Handle::new(4)).unwrap();
        assert_eq!(wuid.policy(), Policy::Queued);
        assert!(registry.wait_queue().is_listed(Handle::new(4)));
        assert!(registry.device(Handle::new(5)).is_none());
        assert!(registry.device(Handle::new(-1)).is_none());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let registry = DeviceRegistry::new(Params::default());
        registry.shutdown();
        registry.shutdown();
        assert!(registry.is_empty());
        assert!(!registry.wait_queue().is_listed(Handle::new(6)));
    }
}
