//! Runtime: one shared execution vehicle hosting a group of contexts.
//!
//! A runtime owns an ordered member list of contexts sharing a priority
//! band (or exactly one context, when created for an exclusive request),
//! the round-robin cursor over that list, and the common wake semaphore
//! its scheduler blocks on. The backing task exists only while the runtime
//! has at least one enabled member; the runtime object and its member list
//! persist for the process lifetime.

use crate::backend::{Backend, Semaphore, TaskHandle};
use crate::context::{Context, Priority};
use crate::error::Result;
use crate::runtime::scheduler::SchedulerRunner;

use log::debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct RuntimeShared {
    pub(crate) index: usize,
    pub(crate) priority: Priority,
    /// True when created to satisfy an exclusive-runtime request; such a
    /// runtime is never reused for another context.
    pub(crate) separate: bool,
    /// Members in registration order. Only ever appended to.
    pub(crate) members: Mutex<Vec<Arc<Context>>>,
    /// Index of the next member the scheduler examines first.
    pub(crate) cursor: AtomicUsize,
    /// Maximum stack size requested by any member; never shrunk.
    pub(crate) stack_size: AtomicUsize,
    /// True while the runtime has at least one enabled member.
    pub(crate) enabled: AtomicBool,
    /// Common wake semaphore, posted whenever any member becomes ready.
    pub(crate) wake: Arc<dyn Semaphore>,
    /// Asks the current backing task to exit.
    pub(crate) stop: AtomicBool,
    task: Mutex<Option<Box<dyn TaskHandle>>>,
}

impl RuntimeShared {
    pub(crate) fn new(
        index: usize,
        priority: Priority,
        separate: bool,
        wake: Arc<dyn Semaphore>,
    ) -> Self {
        Self {
            index,
            priority,
            separate,
            members: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            stack_size: AtomicUsize::new(0),
            enabled: AtomicBool::new(false),
            wake,
            stop: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Appends a member and raises the tracked stack size to the maximum
    /// over all members so far.
    pub(crate) fn add_member(&self, context: Arc<Context>) {
        self.stack_size
            .fetch_max(context.config.stack_size, Ordering::AcqRel);
        if context.is_enabled() {
            self.enabled.store(true, Ordering::Release);
        }
        self.members.lock().unwrap().push(context);
    }

    pub(crate) fn has_enabled_member(&self) -> bool {
        self.members
            .lock()
            .unwrap()
            .iter()
            .any(|member| member.is_enabled())
    }

    pub(crate) fn has_task(&self) -> bool {
        self.task.lock().unwrap().is_some()
    }

    /// Starts the backing task if it does not exist yet.
    pub(crate) fn ensure_task(self: &Arc<Self>, backend: &dyn Backend) -> Result<()> {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return Ok(());
        }

        self.stop.store(false, Ordering::Release);
        let runner = Arc::new(SchedulerRunner::new(self.clone()));
        let handle = backend.start_runner(
            format!("taskmux-rt-{}", self.index),
            self.stack_size.load(Ordering::Acquire),
            self.priority,
            runner,
        )?;
        *task = Some(handle);
        Ok(())
    }

    /// Tears down the backing task, keeping the runtime and its member
    /// list intact for a future re-enable.
    pub(crate) fn stop_task(&self) {
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            debug!("stopping runtime task taskmux-rt-{}", self.index);
            self.stop.store(true, Ordering::Release);
            self.wake.give();
            handle.stop();
        }
    }
}
