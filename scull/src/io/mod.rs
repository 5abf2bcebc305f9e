//! Storage layer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  DeviceHandle (per session)         │
//! │  - cursor                           │
//! │  - read / write / seek              │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ locks the device's store guard
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  QuantumStore (per device)          │
//! │  - size, geometry                   │
//! │  - chain of qsets                   │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ owns
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Qset ── slots ──▶ Quantum          │
//! │  (index block)     (leaf bytes)     │
//! └─────────────────────────────────────┘
//! ```

pub mod qset;
pub mod store;
pub mod types;

pub use qset::{Quantum, Slot};
pub use store::{QuantumStore, MAX_CHAIN_LEN};
pub use types::{
    Geometry, Position, StoreError, StoreLimits, StoreStats, DEFAULT_QSET, DEFAULT_QUANTUM,
};
