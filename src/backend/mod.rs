//! Backend strategy: the OS-specific primitives everything else builds on.
//!
//! Each backend supplies the same small contract: counting semaphores,
//! re-entrant guard locks, bounded fixed-element queues, runtime task
//! spawning, and a nestable protected section. The registry, scheduler,
//! and façade never look behind it. Three strategies exist:
//!
//! - [`threads`]: preemptive backend over std primitives; its native queue
//!   carries full element payloads.
//! - [`parking`]: preemptive backend over `parking_lot` primitives; its
//!   native queue transports only small integer tags, so payloads travel
//!   through a slot table layered on top.
//! - [`coop`]: cooperative backend for hosts without preemption; locks
//!   degrade to nesting counters and dispatch is driven manually.

pub(crate) mod coop;
pub(crate) mod parking;
pub(crate) mod slots;
pub(crate) mod threads;

use crate::context::Priority;
use crate::error::Result;

use std::sync::Arc;
use std::time::Duration;

/// Selects the backend strategy an adaptor is built on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Preemptive backend over std sync primitives and threads.
    #[default]
    Threads,
    /// Preemptive backend over `parking_lot` primitives with the
    /// slot-table queue.
    Parking,
    /// Cooperative backend; no tasks are spawned and dispatch is driven
    /// through [`Adaptor::run_pending`].
    ///
    /// [`Adaptor::run_pending`]: crate::Adaptor::run_pending
    Coop,
}

/// One scheduler pass outcome, produced by a runtime's [`Runner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pass {
    /// A ready context was selected and its step ran to completion.
    Dispatched,
    /// No member was ready; the pass found nothing to do.
    Idle,
    /// The runtime has been asked to stop; the task body must exit.
    Stopped,
}

/// The body a backend drives on behalf of one runtime.
///
/// Preemptive backends loop `pass(true)` on a dedicated task until it
/// returns [`Pass::Stopped`]; the cooperative backend never blocks and the
/// host calls `pass(false)` explicitly instead.
pub(crate) trait Runner: Send + Sync {
    fn pass(&self, block: bool) -> Pass;
}

/// Handle to one spawned runtime task.
pub(crate) trait TaskHandle: Send {
    /// Joins the task after its runner observed the stop request.
    /// Called after the stop flag is set and the wake semaphore posted;
    /// a task stopping itself from inside a step is detached, not joined.
    fn stop(self: Box<Self>);
}

/// Counting semaphore.
///
/// `give` is callable from any execution context and never blocks; that is
/// what makes signal and queue posting interrupt-safe.
pub(crate) trait Semaphore: Send + Sync {
    /// Posts one count.
    fn give(&self);
    /// Non-blocking take.
    fn try_take(&self) -> bool;
    /// Blocking take. The cooperative backend cannot block and degrades
    /// this to a non-blocking attempt.
    fn take(&self) -> bool;
}

/// Re-entrant guard lock with timed acquisition.
///
/// The same logical owner may acquire nested without deadlocking itself;
/// every acquire needs a matching release.
pub(crate) trait GuardLock: Send + Sync {
    /// Acquires, blocking up to `timeout` (`None` waits indefinitely).
    /// Returns false on timeout or backend failure.
    fn acquire(&self, timeout: Option<Duration>) -> bool;
    /// Releases one level of ownership. Returns false when the caller is
    /// not the owner.
    fn release(&self) -> bool;
}

/// Bounded FIFO of fixed-size elements.
///
/// `push` is callable from any execution context; a full queue fails fast
/// and drops the data rather than blocking. `read` never blocks either.
pub(crate) trait PayloadQueue: Send + Sync {
    fn push(&self, data: &[u8]) -> Result<()>;
    fn read(&self, out: &mut [u8]) -> Result<usize>;
}

/// The backend strategy contract.
pub(crate) trait Backend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>>;

    fn create_guard(&self) -> Result<Arc<dyn GuardLock>>;

    fn create_queue(&self, capacity: usize, element_size: usize) -> Result<Arc<dyn PayloadQueue>>;

    /// Starts the backing task for one runtime. The priority band maps
    /// monotonically onto whatever the platform offers; the host backends
    /// record it for diagnostics only.
    fn start_runner(
        &self,
        name: String,
        stack_size: usize,
        priority: Priority,
        runner: Arc<dyn Runner>,
    ) -> Result<Box<dyn TaskHandle>>;

    /// Enters the global protected section. Nests; every begin needs a
    /// matching [`protected_end`](Self::protected_end).
    fn protected_begin(&self);

    /// Leaves the global protected section.
    fn protected_end(&self);
}

/// RAII pairing for the protected section, so early returns cannot leave
/// it held.
pub(crate) struct ProtectedSection<'a> {
    backend: &'a dyn Backend,
}

impl<'a> ProtectedSection<'a> {
    pub(crate) fn enter(backend: &'a dyn Backend) -> Self {
        backend.protected_begin();
        Self { backend }
    }
}

impl Drop for ProtectedSection<'_> {
    fn drop(&mut self) {
        self.backend.protected_end();
    }
}

/// Instantiates the selected backend strategy.
pub(crate) fn create(kind: BackendKind) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Threads => Arc::new(threads::ThreadsBackend::new()),
        BackendKind::Parking => Arc::new(parking::ParkingBackend::new()),
        BackendKind::Coop => Arc::new(coop::CoopBackend::new()),
    }
}
