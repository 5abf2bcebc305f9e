//! Qsets and quanta, the two allocation units of the store

use super::types::StoreError;

/// Fixed-size leaf block of store memory
pub type Quantum = Box<[u8]>;

/// A quantum slot: empty until the first write touches it
pub type Slot = Option<Quantum>;

/// Allocate a zero-filled quantum
///
/// Allocation failure is reported instead of aborting the process.
pub(crate) fn alloc_quantum(size: usize) -> Result<Quantum, StoreError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| StoreError::OutOfMemory)?;
    bytes.resize(size, 0);
    Ok(bytes.into_boxed_slice())
}

/// One link of the chain: an index block of quantum slots
///
/// The slot array is allocated on the first write that lands in this qset.
#[derive(Default)]
pub(crate) struct Qset {
    slots: Option<Vec<Slot>>,
}

impl Qset {
    /// Quantum at `slot`, or `None` for a hole
    pub(crate) fn quantum(&self, slot: usize) -> Option<&[u8]> {
        self.slots.as_ref()?.get(slot)?.as_deref()
    }

    /// Slot at `index`, allocating the slot array of `qset_size` entries if needed
    pub(crate) fn slot_mut(&mut self, index: usize, qset_size: usize) -> Result<&mut Slot, StoreError> {
        if self.slots.is_none() {
            let mut slots = Vec::new();
            slots
                .try_reserve_exact(qset_size)
                .map_err(|_| StoreError::OutOfMemory)?;
            slots.resize_with(qset_size, || None);
            self.slots = Some(slots);
        }
        self.slots
            .as_mut()
            .and_then(|slots| slots.get_mut(index))
            .ok_or(StoreError::OutOfMemory)
    }

    /// Number of allocated quanta
    pub(crate) fn quanta(&self) -> usize {
        self.slots
            .as_ref()
            .map_or(0, |slots| slots.iter().filter(|slot| slot.is_some()).count())
    }
}

impl std::fmt::Debug for Qset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Qset")
            .field("slots", &self.slots.as_ref().map(Vec::len))
            .field("quanta", &self.quanta())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_quantum_is_zeroed() {
        let quantum = alloc_quantum(16).unwrap();
        assert_eq!(quantum.len(), 16);
        assert!(quantum.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_new_qset_is_all_holes() {
        let qset = Qset::default();
        assert_eq!(qset.quantum(0), None);
        assert_eq!(qset.quanta(), 0);
    }

    #[test]
    fn test_slot_mut_allocates_slot_array_once() {
        let mut qset = Qset::default();
        *qset.slot_mut(3, 8).unwrap() = Some(alloc_quantum(4).unwrap());
        assert!(qset.slot_mut(7, 8).unwrap().is_none());
        assert_eq!(qset.quanta(), 1);
        assert_eq!(qset.quantum(3), Some(&[0u8; 4][..]));
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut qset = Qset::default();
        assert_eq!(qset.slot_mut(8, 8).err(), Some(StoreError::OutOfMemory));
    }
}
