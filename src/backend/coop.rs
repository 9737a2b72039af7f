//! Cooperative backend for hosts without a preemptive kernel.
//!
//! Nothing here ever blocks and no task is spawned: semaphores degrade to
//! atomic counters, the guard lock to a plain nesting counter, the
//! protected section to a paired no-op, and the queue to a single-producer
//! single-consumer ring buffer. Dispatch is driven manually through
//! [`Adaptor::run_pending`](crate::Adaptor::run_pending).

use crate::backend::{Backend, GuardLock, PayloadQueue, Runner, Semaphore, TaskHandle};
use crate::context::Priority;
use crate::error::{Error, Result};

use log::debug;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct CoopBackend {
    /// Nesting depth of the protected section. With no competing tasks the
    /// section itself is a no-op, but begin/end must still pair.
    section_depth: AtomicUsize,
}

impl CoopBackend {
    pub(crate) fn new() -> Self {
        Self {
            section_depth: AtomicUsize::new(0),
        }
    }
}

impl Backend for CoopBackend {
    fn name(&self) -> &'static str {
        "coop"
    }

    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>> {
        Ok(Arc::new(CounterSemaphore::new()))
    }

    fn create_guard(&self) -> Result<Arc<dyn GuardLock>> {
        Ok(Arc::new(CounterLock::new()))
    }

    fn create_queue(&self, capacity: usize, element_size: usize) -> Result<Arc<dyn PayloadQueue>> {
        Ok(Arc::new(RingQueue::new(capacity, element_size)))
    }

    fn start_runner(
        &self,
        name: String,
        _stack_size: usize,
        priority: Priority,
        _runner: Arc<dyn Runner>,
    ) -> Result<Box<dyn TaskHandle>> {
        // No task to spawn; the host drives dispatch explicitly.
        debug!("cooperative runtime {name} registered (priority {priority:?})");
        Ok(Box::new(CoopTask))
    }

    fn protected_begin(&self) {
        self.section_depth.fetch_add(1, Ordering::AcqRel);
    }

    fn protected_end(&self) {
        self.section_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

struct CoopTask;

impl TaskHandle for CoopTask {
    fn stop(self: Box<Self>) {}
}

/// Semaphore degraded to an atomic counter.
struct CounterSemaphore {
    count: AtomicUsize,
}

impl CounterSemaphore {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }
}

impl Semaphore for CounterSemaphore {
    fn give(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn try_take(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }

    fn take(&self) -> bool {
        // Cannot block cooperatively; degrade to a non-blocking attempt.
        self.try_take()
    }
}

/// Guard lock degraded to a nesting counter: with one execution context
/// there is nothing to exclude, but acquire/release must still pair.
struct CounterLock {
    depth: AtomicUsize,
}

impl CounterLock {
    fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
        }
    }
}

impl GuardLock for CounterLock {
    fn acquire(&self, _timeout: Option<Duration>) -> bool {
        self.depth.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn release(&self) -> bool {
        self.depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                depth.checked_sub(1)
            })
            .is_ok()
    }
}

/// Simple ring buffer of fixed-size elements with atomic read/write
/// indices, safe for one interrupt-style producer and one consumer. One
/// slot stays unused to tell full from empty, so `capacity + 1` slots are
/// allocated for a capacity of `capacity` elements.
struct RingQueue {
    storage: Box<[UnsafeCell<u8>]>,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
    slots: usize,
    element_size: usize,
}

// Producer writes only at write_idx, consumer reads only at read_idx, and
// the index handoffs use release/acquire ordering.
unsafe impl Sync for RingQueue {}

impl RingQueue {
    fn new(capacity: usize, element_size: usize) -> Self {
        let slots = capacity + 1;
        let storage = (0..slots * element_size)
            .map(|_| UnsafeCell::new(0u8))
            .collect();

        Self {
            storage,
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
            slots,
            element_size,
        }
    }
}

impl PayloadQueue for RingQueue {
    fn push(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.element_size {
            return Err(Error::InvalidParameter);
        }
        let write = self.write_idx.load(Ordering::Relaxed);
        let read = self.read_idx.load(Ordering::Acquire);
        let next_write = (write + 1) % self.slots;
        if next_write == read {
            return Err(Error::QueueFull);
        }

        let base = write * self.element_size;
        for (offset, byte) in data.iter().enumerate() {
            unsafe { *self.storage[base + offset].get() = *byte };
        }
        self.write_idx.store(next_write, Ordering::Release);
        Ok(())
    }

    fn read(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.element_size {
            return Err(Error::InvalidParameter);
        }
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        if read == write {
            return Err(Error::QueueEmpty);
        }

        let base = read * self.element_size;
        for offset in 0..self.element_size {
            out[offset] = unsafe { *self.storage[base + offset].get() };
        }
        self.read_idx.store((read + 1) % self.slots, Ordering::Release);
        Ok(self.element_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    #[test]
    fn test_protected_section_nesting_pairs() {
        let backend = CoopBackend::new();
        backend.protected_begin();
        backend.protected_begin();
        backend.protected_end();
        assert_eq!(
            backend.section_depth.load(Ordering::Acquire),
            1,
            "inner end leaves the section one level deep"
        );
        backend.protected_end();
        assert_eq!(backend.section_depth.load(Ordering::Acquire), 0);
    }
}
