//! Slot table: payload storage for a native queue that only carries tags.
//!
//! The parking backend's native queue transports small integer message
//! tags, not element payloads. The slot table bridges the gap: a fixed
//! array of N free/reserved markers plus an N×element-size backing buffer.
//! A push claims the lowest-indexed free slot, copies the payload in, and
//! sends only the slot index through the native queue; the reader copies
//! the payload out and immediately frees the slot.
//!
//! The allocator is a deliberate O(N) first-free linear scan, and it is
//! safe for a concurrent interrupt-style producer and task consumer
//! without a lock: the only shared transitions are single-byte atomic
//! marker writes, and a slot's bytes are touched exclusively between a
//! successful reservation and the matching release.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

const FREE: u8 = 0;
const RESERVED: u8 = 1;

pub(super) struct SlotTable {
    markers: Box<[AtomicU8]>,
    storage: Box<[UnsafeCell<u8>]>,
    element_size: usize,
}

// A slot's storage bytes are only written between a successful FREE ->
// RESERVED transition and the release back to FREE, so no two threads
// touch the same bytes concurrently.
unsafe impl Sync for SlotTable {}

impl SlotTable {
    pub(super) fn new(capacity: usize, element_size: usize) -> Self {
        let markers = (0..capacity).map(|_| AtomicU8::new(FREE)).collect();
        let storage = (0..capacity * element_size)
            .map(|_| UnsafeCell::new(0u8))
            .collect();

        Self {
            markers,
            storage,
            element_size,
        }
    }

    /// Claims the lowest-indexed free slot and copies `data` into it.
    /// Returns the slot index, or `None` when every slot is reserved.
    pub(super) fn reserve(&self, data: &[u8]) -> Option<usize> {
        debug_assert_eq!(data.len(), self.element_size);

        for (index, marker) in self.markers.iter().enumerate() {
            if marker
                .compare_exchange(FREE, RESERVED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let base = index * self.element_size;
                for (offset, byte) in data.iter().enumerate() {
                    unsafe { *self.storage[base + offset].get() = *byte };
                }
                return Some(index);
            }
        }
        None
    }

    /// Copies the payload of a reserved slot into `out` and frees the slot.
    pub(super) fn take(&self, index: usize, out: &mut [u8]) {
        debug_assert!(out.len() >= self.element_size);

        let base = index * self.element_size;
        for offset in 0..self.element_size {
            out[offset] = unsafe { *self.storage[base + offset].get() };
        }
        self.markers[index].store(FREE, Ordering::Release);
    }
}
