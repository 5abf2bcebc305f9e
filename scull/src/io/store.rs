//! Sparse quantum store
//!
//! A linear byte region backed by a chain of qsets. Each qset indexes
//! `qset` quanta of `quantum` bytes, so qset `n` covers the offsets
//! `[n * itemsize, (n + 1) * itemsize)`. Nothing is allocated up front:
//! writes extend the chain and allocate quanta on first touch, trim frees
//! everything.
//!
//! # Holes
//!
//! Offsets below `size` whose quantum was never written are holes. A hole
//! reads as zero bytes delivered, the same as end of data. It is up to the
//! caller to decide whether that means EOF.
//!
//! # Quantum boundaries
//!
//! A single `read` or `write` never crosses a quantum boundary. A short
//! count is normal flow control; callers loop with an advancing offset.

use super::qset::{alloc_quantum, Qset, Slot};
use super::types::{Geometry, StoreError, StoreLimits, StoreStats};
use crate::params::Defaults;

/// Hard ceiling on the chain length, applied on top of `StoreLimits`
///
/// Offsets that would need qset `MAX_CHAIN_LEN` or beyond are refused with
/// `OutOfMemory` before any link is appended.
pub const MAX_CHAIN_LEN: usize = 1 << 20;

/// The byte region of one device
///
/// Not synchronized by itself; the owning device wraps it in its guard.
pub struct QuantumStore {
    chain: Vec<Qset>,
    size: u64,
    geometry: Geometry,
    defaults: Defaults,
    limits: StoreLimits,
    quanta: usize,
}

impl QuantumStore {
    /// Create an empty store using the current default geometry
    #[must_use]
    pub fn new(defaults: Defaults, limits: StoreLimits) -> Self {
        Self {
            chain: Vec::new(),
            size: 0,
            geometry: defaults.geometry(),
            defaults,
            limits,
            quanta: 0,
        }
    }

    /// End of valid data
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Geometry captured at creation or at the last trim
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of qsets in the chain
    #[must_use]
    pub fn qset_count(&self) -> usize {
        self.chain.len()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            size: self.size,
            qsets: self.chain.len(),
            quanta: self.quanta,
            geometry: self.geometry,
        }
    }

    /// Walk the chain to qset `item`, appending empty qsets as needed
    ///
    /// Links are appended one at a time, so a failure leaves every link
    /// appended so far in place.
    fn follow(&mut self, item: u64) -> Result<&mut Qset, StoreError> {
        let item = usize::try_from(item)
            .ok()
            .filter(|item| *item < MAX_CHAIN_LEN)
            .ok_or_else(|| {
                log::debug!("store.follow: item {item} beyond the chain ceiling");
                StoreError::OutOfMemory
            })?;

        while self.chain.len() <= item {
            if !self.limits.allows_qsets(self.chain.len()) {
                log::debug!(
                    "store.follow: qset limit {} reached (want item {item})",
                    self.limits.max_qsets
                );
                return Err(StoreError::OutOfMemory);
            }
            self.chain
                .try_reserve(1)
                .map_err(|_| StoreError::OutOfMemory)?;
            self.chain.push(Qset::default());
        }

        self.chain.get_mut(item).ok_or(StoreError::OutOfMemory)
    }

    /// Slot holding the quantum for `offset`
    ///
    /// Extends the chain and allocates the qset's slot array if needed. The
    /// quantum itself is not allocated.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OutOfMemory` if an allocation fails or a limit is
    /// reached. The chain prefix built before the failure stays linked.
    pub(crate) fn locate(&mut self, offset: u64) -> Result<&mut Slot, StoreError> {
        let pos = self.geometry.position(offset);
        let qset_size = self.geometry.qset();
        self.follow(pos.item)?.slot_mut(pos.slot, qset_size)
    }

    /// Read from `offset` into `buf`
    ///
    /// Returns the number of bytes copied, clamped to the end of data and to
    /// the end of the quantum holding `offset`. Returns 0 at or past `size`
    /// and inside holes. Never allocates.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= self.size || buf.is_empty() {
            return 0;
        }

        let pos = self.geometry.position(offset);
        let quantum = usize::try_from(pos.item)
            .ok()
            .and_then(|item| self.chain.get(item))
            .and_then(|qset| qset.quantum(pos.slot));
        let Some(quantum) = quantum else {
            log::trace!("store.read: hole at offset {offset}");
            return 0;
        };

        let available = usize::try_from(self.size - offset).unwrap_or(usize::MAX);
        let count = buf
            .len()
            .min(available)
            .min(quantum.len().saturating_sub(pos.offset));

        // count <= quantum.len() - pos.offset and count <= buf.len()
        #[allow(clippy::indexing_slicing)]
        {
            buf[..count].copy_from_slice(&quantum[pos.offset..pos.offset + count]);
        }
        count
    }

    /// Write `data` at `offset`
    ///
    /// Copies at most up to the end of the quantum holding `offset` and
    /// returns the number of bytes written. Interior holes skipped over are
    /// left unallocated. An empty write allocates nothing and returns 0.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::OutOfMemory` if an allocation fails or a limit is
    /// reached; `size` is not changed in that case.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize, StoreError> {
        if data.is_empty() {
            return Ok(0);
        }

        let pos = self.geometry.position(offset);
        let quantum_size = self.geometry.quantum();
        let may_allocate = self.limits.allows_quanta(self.quanta);

        let slot = self.locate(offset)?;
        let mut allocated = false;
        if slot.is_none() {
            if !may_allocate {
                log::debug!("store.write: quantum limit reached at offset {offset}");
                return Err(StoreError::OutOfMemory);
            }
            *slot = Some(alloc_quantum(quantum_size)?);
            allocated = true;
        }
        let Some(quantum) = slot.as_mut() else {
            return Err(StoreError::OutOfMemory);
        };

        let count = data.len().min(quantum.len().saturating_sub(pos.offset));
        // count <= quantum.len() - pos.offset
        #[allow(clippy::indexing_slicing)]
        {
            quantum[pos.offset..pos.offset + count].copy_from_slice(&data[..count]);
        }

        if allocated {
            self.quanta += 1;
        }
        self.size = self.size.max(offset.saturating_add(count as u64));
        Ok(count)
    }

    /// Free every quantum and qset, reset size to 0 and re-read the default geometry
    ///
    /// Idempotent.
    pub fn trim(&mut self) {
        let freed = self.stats();
        self.chain = Vec::new();
        self.size = 0;
        self.quanta = 0;
        self.geometry = self.defaults.geometry();
        log::debug!(
            "store.trim: freed {} qsets, {} quanta, {} bytes; geometry now {:?}",
            freed.qsets,
            freed.quanta,
            freed.size,
            self.geometry
        );
    }
}

impl std::fmt::Debug for QuantumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QuantumStore(size={}, qsets={}, quanta={}, geometry={:?})",
            self.size,
            self.chain.len(),
            self.quanta,
            self.geometry
        )
    }
}
