//! Preemptive backend over `parking_lot` primitives.
//!
//! Mirrors the threads backend in shape but differs where the underlying
//! kernel differs: its native queue can only transport small integer tags,
//! so element payloads ride in a [`SlotTable`](super::slots::SlotTable)
//! and only slot indices pass through the queue itself.

use crate::backend::slots::SlotTable;
use crate::backend::{Backend, GuardLock, Pass, PayloadQueue, Runner, Semaphore, TaskHandle};
use crate::context::Priority;
use crate::error::{Error, Result};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

pub(crate) struct ParkingBackend {
    section: ParkingRecursiveLock,
}

impl ParkingBackend {
    pub(crate) fn new() -> Self {
        Self {
            section: ParkingRecursiveLock::new(),
        }
    }
}

impl Backend for ParkingBackend {
    fn name(&self) -> &'static str {
        "parking"
    }

    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>> {
        Ok(Arc::new(ParkingSemaphore::new()))
    }

    fn create_guard(&self) -> Result<Arc<dyn GuardLock>> {
        Ok(Arc::new(ParkingRecursiveLock::new()))
    }

    fn create_queue(&self, capacity: usize, element_size: usize) -> Result<Arc<dyn PayloadQueue>> {
        Ok(Arc::new(SlotQueue::new(capacity, element_size)))
    }

    fn start_runner(
        &self,
        name: String,
        stack_size: usize,
        priority: Priority,
        runner: Arc<dyn Runner>,
    ) -> Result<Box<dyn TaskHandle>> {
        let mut builder = thread::Builder::new().name(name.clone());
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }
        debug!("starting runtime task {name} (priority {priority:?})");

        let join = builder
            .spawn(move || {
                loop {
                    if runner.pass(true) == Pass::Stopped {
                        break;
                    }
                }
                debug!("runtime task exiting");
            })
            .map_err(|err| {
                warn!("failed to spawn runtime task {name}: {err}");
                Error::AllocationFailed
            })?;

        Ok(Box::new(ParkingTask { join: Some(join) }))
    }

    fn protected_begin(&self) {
        self.section.acquire(None);
    }

    fn protected_end(&self) {
        self.section.release();
    }
}

struct ParkingTask {
    join: Option<JoinHandle<()>>,
}

impl TaskHandle for ParkingTask {
    fn stop(mut self: Box<Self>) {
        if let Some(join) = self.join.take() {
            if join.thread().id() == thread::current().id() {
                return;
            }
            let _ = join.join();
        }
    }
}

struct ParkingSemaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl ParkingSemaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            available: Condvar::new(),
        }
    }
}

impl Semaphore for ParkingSemaphore {
    fn give(&self) {
        *self.count.lock() += 1;
        self.available.notify_one();
    }

    fn try_take(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn take(&self) -> bool {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
        true
    }
}

struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

struct ParkingRecursiveLock {
    state: Mutex<LockState>,
    freed: Condvar,
}

impl ParkingRecursiveLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            freed: Condvar::new(),
        }
    }
}

impl GuardLock for ParkingRecursiveLock {
    fn acquire(&self, timeout: Option<Duration>) -> bool {
        let me = thread::current().id();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.depth += 1;
            return true;
        }

        while state.owner.is_some() {
            match deadline {
                Some(deadline) => {
                    if self.freed.wait_until(&mut state, deadline).timed_out()
                        && state.owner.is_some()
                    {
                        return false;
                    }
                }
                None => self.freed.wait(&mut state),
            }
        }

        state.owner = Some(me);
        state.depth = 1;
        true
    }

    fn release(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.freed.notify_one();
        }
        true
    }
}

/// Payload queue layered over a tag-only native queue.
///
/// `tags` is the native transport and carries slot indices exclusively;
/// the payload bytes live in the slot table. FIFO order is the order in
/// which tags enter the native queue.
struct SlotQueue {
    tags: Mutex<VecDeque<usize>>,
    slots: SlotTable,
    element_size: usize,
}

impl SlotQueue {
    fn new(capacity: usize, element_size: usize) -> Self {
        Self {
            tags: Mutex::new(VecDeque::with_capacity(capacity)),
            slots: SlotTable::new(capacity, element_size),
            element_size,
        }
    }
}

impl PayloadQueue for SlotQueue {
    fn push(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.element_size {
            return Err(Error::InvalidParameter);
        }
        // Reserve before posting the tag; a full slot table means every
        // element is still outstanding, which is exactly "queue full".
        let index = self.slots.reserve(data).ok_or(Error::QueueFull)?;
        self.tags.lock().push_back(index);
        Ok(())
    }

    fn read(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.element_size {
            return Err(Error::InvalidParameter);
        }
        let index = self.tags.lock().pop_front().ok_or(Error::QueueEmpty)?;
        self.slots.take(index, out);
        Ok(self.element_size)
    }
}
