//! Process-wide registry of runtimes.
//!
//! The registry resolves "does a compatible runtime already exist for this
//! priority" during registration and owns the enable/disable path that
//! makes membership inspection and mutation atomic with respect to every
//! other task. It is populated during the pre-start registration phase and
//! never shrinks: runtimes persist even when emptied of enabled members,
//! only their backing task is torn down.

use crate::backend::{Backend, Pass, ProtectedSection, Runner};
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::runtime::RuntimeShared;
use crate::runtime::scheduler::SchedulerRunner;

use log::debug;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

pub(crate) struct RuntimeRegistry {
    runtimes: Mutex<Vec<Arc<RuntimeShared>>>,
}

impl RuntimeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            runtimes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn runtime_count(&self) -> usize {
        self.runtimes.lock().unwrap().len()
    }

    /// Registers a context with its hosting runtime.
    ///
    /// An exclusive request always gets a brand-new runtime of its own;
    /// otherwise the first non-exclusive runtime with an equal priority is
    /// reused, or a new one created.
    pub(crate) fn register(
        &self,
        backend: &dyn Backend,
        context: &Arc<Context>,
    ) -> Result<Arc<RuntimeShared>> {
        let mut runtimes = self.runtimes.lock().unwrap();

        let separate = context.config.requirements.runtime_separate;
        let existing = if separate {
            None
        } else {
            runtimes
                .iter()
                .find(|runtime| !runtime.separate && runtime.priority == context.config.priority)
                .cloned()
        };

        let runtime = match existing {
            Some(runtime) => runtime,
            None => {
                let wake = backend.create_semaphore()?;
                let runtime = Arc::new(RuntimeShared::new(
                    runtimes.len(),
                    context.config.priority,
                    separate,
                    wake,
                ));
                debug!(
                    "created runtime {} (priority {:?}, separate: {separate})",
                    runtime.index, runtime.priority
                );
                runtimes.push(runtime.clone());
                runtime
            }
        };

        runtime.add_member(context.clone());
        context.set_runtime(runtime.clone());
        Ok(runtime)
    }

    /// Starts the backing task of every enabled runtime that does not have
    /// one yet, resetting its cursor to the head of the member list.
    ///
    /// A task-creation failure is reported once through each member
    /// context's error hook and does not stop the remaining runtimes from
    /// starting.
    pub(crate) fn complete(&self, backend: &dyn Backend) {
        let runtimes = self.runtimes.lock().unwrap().clone();
        for runtime in runtimes {
            if !runtime.enabled.load(Ordering::Acquire) || runtime.has_task() {
                continue;
            }
            runtime.cursor.store(0, Ordering::Relaxed);
            if runtime.ensure_task(backend).is_err() {
                for member in runtime.members.lock().unwrap().iter() {
                    member.report(ErrorKind::RuntimeInitFailed, 0);
                }
            }
        }
    }

    /// Enables or disables a context, inside the global protected section
    /// so membership inspection and mutation stay atomic.
    pub(crate) fn enable(
        &self,
        backend: &dyn Backend,
        context: &Arc<Context>,
        enable: bool,
    ) -> Result<()> {
        let _section = ProtectedSection::enter(backend);

        if context.is_enabled() == enable {
            return Ok(());
        }

        if enable {
            context.allocate_resources(backend).inspect_err(|_| {
                context.report(ErrorKind::RuntimeInitFailed, 0);
            })?;
            context.set_enabled(true);

            // The guard is handed to the caller, who must release it.
            if context.config.requirements.guard && context.acquire().is_err() {
                context.report(ErrorKind::AcquireFailed, 0);
            }

            if let Some(runtime) = context.runtime() {
                runtime.enabled.store(true, Ordering::Release);
                runtime.ensure_task(backend).inspect_err(|_| {
                    context.report(ErrorKind::RuntimeInitFailed, 0);
                })?;
                // Force a rescan so readiness that predates the re-enable
                // is picked up again.
                runtime.wake.give();
            }
        } else {
            context.set_enabled(false);
            context.free_resources();

            if let Some(runtime) = context.runtime()
                && !runtime.has_enabled_member()
            {
                runtime.enabled.store(false, Ordering::Release);
                // Join outside the protected section: the exiting task may
                // be mid-step and that step may take the section itself.
                drop(_section);
                runtime.stop_task();
            }
        }
        Ok(())
    }

    /// Dispatches every currently-ready context once, on the caller's
    /// thread, one fair lap per runtime. This is the drive mechanism of
    /// the cooperative backend.
    pub(crate) fn run_pending(&self) -> usize {
        let runtimes = self.runtimes.lock().unwrap().clone();
        let mut dispatched = 0;
        for runtime in runtimes {
            let runner = SchedulerRunner::new(runtime);
            while runner.pass(false) == Pass::Dispatched {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Stops every backing task. Runtimes and their member lists survive.
    pub(crate) fn shutdown(&self) {
        let runtimes = self.runtimes.lock().unwrap().clone();
        for runtime in runtimes {
            runtime.stop_task();
        }
    }
}
