//! Store geometry, limits and error types

use std::fmt;

/// Default size of one quantum, in bytes
pub const DEFAULT_QUANTUM: usize = 4000;

/// Default number of quantum slots in one qset
pub const DEFAULT_QSET: usize = 1000;

/// Block geometry of a store: quantum size and number of slots per qset
///
/// The product of the two ("itemsize") is the byte span covered by one qset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    quantum: usize,
    qset: usize,
}

impl Geometry {
    /// Create a geometry
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidGeometry` if either size is zero or the
    /// itemsize does not fit in a signed 64-bit offset.
    pub fn new(quantum: usize, qset: usize) -> Result<Self, StoreError> {
        let itemsize = u64::try_from(quantum)
            .ok()
            .zip(u64::try_from(qset).ok())
            .and_then(|(quantum, qset)| quantum.checked_mul(qset))
            .filter(|itemsize| *itemsize > 0 && i64::try_from(*itemsize).is_ok());

        if itemsize.is_none() {
            return Err(StoreError::InvalidGeometry { quantum, qset });
        }
        Ok(Self { quantum, qset })
    }

    /// Size of one quantum in bytes
    #[must_use]
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Number of quantum slots per qset
    #[must_use]
    pub fn qset(&self) -> usize {
        self.qset
    }

    /// Byte span covered by one qset
    #[must_use]
    pub fn itemsize(&self) -> u64 {
        self.quantum as u64 * self.qset as u64
    }

    /// Split a linear offset into (qset index, slot index, offset in quantum)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn position(&self, offset: u64) -> Position {
        let itemsize = self.itemsize();
        let quantum = self.quantum as u64;
        let rest = offset % itemsize;
        Position {
            item: offset / itemsize,
            // Both remainders are below a usize-sized divisor
            slot: (rest / quantum) as usize,
            offset: (rest % quantum) as usize,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            qset: DEFAULT_QSET,
        }
    }
}

/// Location of a byte inside the qset chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Index of the qset in the chain
    pub item: u64,
    /// Index of the quantum slot inside the qset
    pub slot: usize,
    /// Byte offset inside the quantum
    pub offset: usize,
}

/// Allocation caps for a single store
///
/// A value of `0` means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_qsets: usize,
    pub max_quanta: usize,
}

impl StoreLimits {
    /// No caps at all
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub(crate) fn allows_qsets(&self, current: usize) -> bool {
        self.max_qsets == 0 || current < self.max_qsets
    }

    pub(crate) fn allows_quanta(&self, current: usize) -> bool {
        self.max_quanta == 0 || current < self.max_quanta
    }
}

/// Snapshot of a store's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// End of valid data
    pub size: u64,
    /// Number of qsets in the chain
    pub qsets: usize,
    /// Number of allocated quanta
    pub quanta: usize,
    pub geometry: Geometry,
}

/// Error type for store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Backing allocation failed, or a store limit was reached
    OutOfMemory,
    /// Zero-sized quantum or qset, or an itemsize that overflows
    InvalidGeometry { quantum: usize, qset: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "Store error: out of memory"),
            Self::InvalidGeometry { quantum, qset } => {
                write!(f, "Store error: invalid geometry quantum={quantum} qset={qset}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
