//! Preemptive backend over std sync primitives and threads.
//!
//! Semaphores and the re-entrant guard are built from `Mutex` + `Condvar`;
//! runtime tasks are `std::thread`s honouring the requested stack size. The
//! native queue of this backend carries full element payloads directly, so
//! no slot table is needed.

use crate::backend::{Backend, GuardLock, Pass, PayloadQueue, Runner, Semaphore, TaskHandle};
use crate::context::Priority;
use crate::error::{Error, Result};

use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

pub(crate) struct ThreadsBackend {
    /// Global protected section; re-entrant so nested begin/end pairs
    /// cannot deadlock their own task.
    section: RecursiveLock,
}

impl ThreadsBackend {
    pub(crate) fn new() -> Self {
        Self {
            section: RecursiveLock::new(),
        }
    }
}

impl Backend for ThreadsBackend {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>> {
        Ok(Arc::new(CountingSemaphore::new()))
    }

    fn create_guard(&self) -> Result<Arc<dyn GuardLock>> {
        Ok(Arc::new(RecursiveLock::new()))
    }

    fn create_queue(&self, capacity: usize, element_size: usize) -> Result<Arc<dyn PayloadQueue>> {
        Ok(Arc::new(PayloadChannel::new(capacity, element_size)))
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

        Ok(Box::new(ThreadTask { join: Some(join) }))
    }

    fn protected_begin(&self) {
        self.section.acquire(None);
    }

    fn protected_end(&self) {
        self.section.release();
    }
}

struct ThreadTask {
    join: Option<JoinHandle<()>>,
}

impl TaskHandle for ThreadTask {
    fn stop(mut self: Box<Self>) {
        if let Some(join) = self.join.take() {
            // A context disabling itself from its own step would join the
            // current thread; detach instead, the loop exits on its own.
            if join.thread().id() == thread::current().id() {
                return;
            }
            let _ = join.join();
        }
    }
}

/// Counting semaphore over `Mutex<usize>` + `Condvar`.
struct CountingSemaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl CountingSemaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            available: Condvar::new(),
        }
    }
}

impl Semaphore for CountingSemaphore {
    fn give(&self) {
        *self.count.lock().unwrap() += 1;
        self.available.notify_one();
    }

    fn try_take(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn take(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.available.wait(count).unwrap();
        }
        *count -= 1;
        true
    }
}

/// Re-entrant lock tracking the owning thread and a nesting depth.
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

pub(super) struct RecursiveLock {
    state: Mutex<LockState>,
    freed: Condvar,
}

impl RecursiveLock {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            freed: Condvar::new(),
        }
    }
}

impl GuardLock for RecursiveLock {
    fn acquire(&self, timeout: Option<Duration>) -> bool {
        let me = thread::current().id();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock().unwrap();

        if state.owner == Some(me) {
            state.depth += 1;
            return true;
        }

        while state.owner.is_some() {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (next, _) = self.freed.wait_timeout(state, deadline - now).unwrap();
                    state = next;
                }
                None => {
                    state = self.freed.wait(state).unwrap();
                }
            }
        }

        state.owner = Some(me);
        state.depth = 1;
        true
    }

    fn release(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
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

/// Native payload-carrying queue: a capacity-bounded deque of boxed
/// elements behind a mutex. Push and read lock only briefly, never block
/// on fullness or emptiness.
struct PayloadChannel {
    elements: Mutex<VecDeque<Box<[u8]>>>,
    capacity: usize,
    element_size: usize,
}

impl PayloadChannel {
    fn new(capacity: usize, element_size: usize) -> Self {
        Self {
            elements: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            element_size,
        }
    }
}

impl PayloadQueue for PayloadChannel {
    fn push(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.element_size {
            return Err(Error::InvalidParameter);
        }
        let mut elements = self.elements.lock().unwrap();
        if elements.len() == self.capacity {
            return Err(Error::QueueFull);
        }
        elements.push_back(data.into());
        Ok(())
    }

    fn read(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.element_size {
            return Err(Error::InvalidParameter);
        }
        let element = self
            .elements
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::QueueEmpty)?;
        out[..self.element_size].copy_from_slice(&element);
        Ok(self.element_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use std::sync::mpsc;

    #[test]
    fn test_protected_section_nests_without_early_release() {
        let backend = Arc::new(ThreadsBackend::new());
        backend.protected_begin();
        backend.protected_begin();
        backend.protected_end();

        // Still one level deep: a contender must stay excluded.
        let contender = backend.clone();
        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            contender.protected_begin();
            tx.send(()).unwrap();
            contender.protected_end();
        });
        assert!(
            rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "inner end must not release the section"
        );

        backend.protected_end();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("outermost end must open the section");
        waiter.join().unwrap();
    }
}
