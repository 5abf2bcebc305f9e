//! Integration tests for QuantumStore

use scull::{Defaults, Geometry, QuantumStore, StoreError, StoreLimits};

fn store_with(quantum: usize, qset: usize) -> QuantumStore {
    QuantumStore::new(
        Defaults::new(Geometry::new(quantum, qset).unwrap()),
        StoreLimits::unlimited(),
    )
}

/// Read everything from `offset` up to `len` bytes, looping over quantum boundaries
fn read_all(store: &QuantumStore, mut offset: u64, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let mut done = 0;
    while done < len {
        let n = store.read(offset, &mut out[done..]);
        if n == 0 {
            break;
        }
        done += n;
        offset += n as u64;
    }
    out.truncate(done);
    out
}

#[test]
fn test_written_bytes_read_back() {
    let mut store = store_with(4000, 1000);

    for (offset, data) in [(0u64, &b"first"[..]), (3998, &b"ab"[..]), (12_345, &b"middle"[..])] {
        assert_eq!(store.write(offset, data).unwrap(), data.len());
    }

    let mut buf = [0u8; 6];
    assert_eq!(store.read(12_345, &mut buf), 6);
    assert_eq!(&buf, b"middle");
    assert_eq!(store.read(0, &mut buf[..5]), 5);
    assert_eq!(&buf[..5], b"first");
    assert_eq!(store.size(), 12_351);
}

#[test]
fn test_read_clamped_at_quantum_boundary() {
    let mut store = store_with(4000, 1000);
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

    let mut offset = 0;
    while offset < data.len() {
        offset += store.write(offset as u64, &data[offset..]).unwrap();
    }

    // A 5000-byte request at 3990 stops at the boundary at 4000
    let mut buf = vec![0u8; 5000];
    assert_eq!(store.read(3990, &mut buf), 10);
    assert_eq!(&buf[..10], &data[3990..4000]);

    // Advancing the offset retrieves the remainder
    assert_eq!(read_all(&store, 3990, 5000), &data[3990..8990]);
}

#[test]
fn test_write_clamped_at_quantum_boundary() {
    let mut store = store_with(4000, 1000);
    assert_eq!(store.write(3995, &[7u8; 100]).unwrap(), 5);
    assert_eq!(store.size(), 4000);
}

#[test]
fn test_read_at_or_past_size_is_empty() {
    let mut store = store_with(16, 4);
    store.write(0, b"0123456789").unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(store.read(10, &mut buf), 0);
    assert_eq!(store.read(1_000_000, &mut buf), 0);
    assert_eq!(store.read(6, &mut buf), 4);
}

#[test]
fn test_hole_reads_as_empty() {
    let mut store = store_with(16, 4);
    // Quantum 0 of qset 0 and all of qset 1 stay unallocated
    store.write(200, b"tail").unwrap();
    assert_eq!(store.size(), 204);

    let mut buf = [0xffu8; 8];
    assert_eq!(store.read(0, &mut buf), 0);
    assert_eq!(store.read(70, &mut buf), 0);
    assert_eq!(buf, [0xffu8; 8]);

    assert_eq!(store.read(200, &mut buf), 4);
    assert_eq!(&buf[..4], b"tail");
}

#[test]
fn test_fresh_quantum_is_zeroed_around_write() {
    let mut store = store_with(16, 4);
    store.write(10, b"x").unwrap();

    let mut buf = [0xffu8; 11];
    assert_eq!(store.read(0, &mut buf), 11);
    assert_eq!(&buf[..10], &[0u8; 10]);
    assert_eq!(buf[10], b'x');
}

#[test]
fn test_trim_empties_store() {
    let mut store = store_with(16, 4);
    store.write(0, b"some data").unwrap();
    store.write(500, b"more").unwrap();

    store.trim();

    assert_eq!(store.size(), 0);
    assert_eq!(store.qset_count(), 0);
    let mut buf = [0u8; 4];
    for offset in [0u64, 3, 500, 1 << 40] {
        assert_eq!(store.read(offset, &mut buf), 0);
    }
}

#[test]
fn test_chain_grows_one_link_per_item() {
    let mut store = store_with(8, 4);
    let itemsize = store.geometry().itemsize();

    for k in 0..5u64 {
        store.write(k * itemsize, b"k").unwrap();
        assert_eq!(store.qset_count(), k as usize + 1);
    }

    // Rewriting inside existing items adds nothing
    for k in 0..5u64 {
        store.write(k * itemsize + 3, b"again").unwrap();
    }
    assert_eq!(store.qset_count(), 5);
    assert_eq!(store.stats().quanta, 5);
}

#[test]
fn test_far_write_links_intermediate_qsets() {
    let mut store = store_with(8, 4);
    let itemsize = store.geometry().itemsize();

    store.write(3 * itemsize, b"x").unwrap();
    assert_eq!(store.qset_count(), 4);
    assert_eq!(store.stats().quanta, 1);
}

#[test]
fn test_qset_limit_keeps_prefix() {
    let mut store = QuantumStore::new(
        Defaults::new(Geometry::new(8, 4).unwrap()),
        StoreLimits {
            max_qsets: 2,
            max_quanta: 0,
        },
    );
    store.write(0, b"keep").unwrap();
    let itemsize = store.geometry().itemsize();

    assert_eq!(store.write(3 * itemsize, b"x"), Err(StoreError::OutOfMemory));

    // The link appended before the failure is still there, data is untouched
    assert_eq!(store.qset_count(), 2);
    assert_eq!(store.size(), 4);
    let mut buf = [0u8; 4];
    assert_eq!(store.read(0, &mut buf), 4);
    assert_eq!(&buf, b"keep");

    // Writes inside the linked prefix still work
    assert_eq!(store.write(itemsize, b"ok").unwrap(), 2);
}

#[test]
fn test_quantum_limit() {
    let mut store = QuantumStore::new(
        Defaults::new(Geometry::new(8, 4).unwrap()),
        StoreLimits {
            max_qsets: 0,
            max_quanta: 1,
        },
    );
    store.write(0, b"a").unwrap();
    assert_eq!(store.write(8, b"b"), Err(StoreError::OutOfMemory));
    assert_eq!(store.size(), 1);

    // The allocated quantum can still be written
    assert_eq!(store.write(1, b"bcd").unwrap(), 3);

    // Trim gives the budget back
    store.trim();
    store.write(8, b"b").unwrap();
}

#[test]
fn test_trim_picks_up_new_defaults() {
    let defaults = Defaults::new(Geometry::new(8, 4).unwrap());
    let mut store = QuantumStore::new(defaults.clone(), StoreLimits::unlimited());
    store.write(0, b"0123456789").unwrap();

    defaults.set(Geometry::new(32, 2).unwrap());
    // No effect until the next trim
    assert_eq!(store.geometry(), Geometry::new(8, 4).unwrap());

    store.trim();
    assert_eq!(store.geometry(), Geometry::new(32, 2).unwrap());
    assert_eq!(store.write(0, &[1u8; 40]).unwrap(), 32);
}
