//! Sparse in-memory byte store with character-device style sessions
//!
//! Each device owns a `QuantumStore`, a byte region that grows lazily in
//! quantum-sized blocks, and a `SessionLock` that decides who may open it.
//! Sessions read, write and seek through a `DeviceHandle`.

pub mod access;
pub mod device;
pub mod error;
pub mod idgen;
pub mod interrupt;
pub mod io;
pub mod params;
pub mod registry;
pub mod wait_queue;

// Re-export admission types for convenience
pub use access::{Credentials, ExclusiveLock, OwnedLock, Policy, QueuedLock, SessionLock, WaitMode};

// Re-export device types for convenience
pub use device::{AccessMode, Device, DeviceHandle, OpenRequest, SeekFrom};

pub use error::ScullError;
pub use idgen::{Handle, IdGen};
pub use interrupt::Interrupt;

// Re-export store types for convenience
pub use io::{Geometry, QuantumStore, StoreError, StoreLimits, StoreStats};

pub use params::{Defaults, Params, ParamsError};
pub use registry::DeviceRegistry;
pub use wait_queue::WaitQueue;
