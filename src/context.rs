//! Context: one registered component's scheduling and resource record.
//!
//! A context is the unit of registration with the adaptor. At creation it
//! declares a capability set: a cooperative step slot, a re-entrant guard,
//! a coalescing signal, a bounded queue. The adaptor provisions exactly
//! the backend resources those capabilities need. The context object itself
//! lives for the process lifetime; only its resources come and go as it is
//! enabled and disabled.

use crate::adaptor::AdaptorShared;
use crate::backend::{Backend, GuardLock, PayloadQueue, Semaphore};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::RuntimeShared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capability set requested at context creation, fixed for the context's
/// lifetime.
///
/// Each capability is independently requestable; the adaptor allocates only
/// the backend resources the set calls for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Wants a step function invoked cooperatively on a shared runtime.
    pub runtime: bool,
    /// Wants an exclusive runtime rather than sharing one per priority band.
    pub runtime_separate: bool,
    /// Starts disabled; resources are allocated on the first `enable`.
    pub start_disabled: bool,
    /// Wants a re-entrant guard lock.
    pub guard: bool,
    /// Wants an interrupt-postable, coalescing wake flag.
    pub signal: bool,
    /// Wants an interrupt-postable bounded FIFO of fixed-size elements.
    pub queue: bool,
}

impl Requirements {
    /// True when the context needs a hosting runtime at all.
    pub(crate) fn wants_runtime(&self) -> bool {
        self.runtime || self.runtime_separate
    }
}

/// Priority band of a context, low to high.
///
/// Priority only determines which runtime a context joins; dispatch order
/// *within* a runtime is round-robin, never priority-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

/// A component's cooperative unit of work.
///
/// Invoked synchronously on the hosting runtime's task; expected to run to
/// completion promptly and not block. Any `Fn() + Send + Sync` closure
/// implements this trait.
pub trait Step: Send + Sync {
    /// Runs one unit of work.
    fn run(&self);
}

impl<F: Fn() + Send + Sync> Step for F {
    fn run(&self) {
        self()
    }
}

/// A component's error sink.
///
/// Receives startup and backend failures that cannot be returned to a
/// caller directly, classified by [`ErrorKind`] with a backend-specific
/// numeric status. Any `Fn(ErrorKind, i32) + Send + Sync` closure
/// implements this trait.
pub trait ErrorHook: Send + Sync {
    /// Reports one failure. Called at most once per failure, never retried.
    fn on_error(&self, kind: ErrorKind, status: i32);
}

impl<F: Fn(ErrorKind, i32) + Send + Sync> ErrorHook for F {
    fn on_error(&self, kind: ErrorKind, status: i32) {
        self(kind, status)
    }
}

/// Configuration accepted by [`Adaptor::create_context`].
///
/// Fields are public so consumers can fill them directly; the fluent
/// `with_*` helpers cover the common cases and keep the capability set and
/// its dependent fields consistent.
///
/// # Example
/// ```ignore
/// let config = ContextConfig::new()
///     .with_step(|| do_work())
///     .with_guard(Duration::from_millis(50))
///     .with_queue(8, 4);
/// ```
///
/// [`Adaptor::create_context`]: crate::Adaptor::create_context
#[derive(Clone)]
pub struct ContextConfig {
    /// Declared capability set.
    pub requirements: Requirements,
    /// Step callback; present iff `runtime` or `runtime_separate` is set.
    pub step: Option<Arc<dyn Step>>,
    /// Error hook receiving startup/backend failure reports.
    pub error: Arc<dyn ErrorHook>,
    /// Priority band selecting the hosting runtime.
    pub priority: Priority,
    /// Requested stack size in bytes for the hosting runtime's task.
    /// Zero means the backend default.
    pub stack_size: usize,
    /// Upper bound for guard acquisition; must be non-zero when `guard`
    /// is requested.
    pub wait_for_guard: Duration,
    /// Queue capacity in elements; must be non-zero when `queue` is set.
    pub queue_size: usize,
    /// Queue element size in bytes; must be non-zero when `queue` is set.
    pub queue_element_size: usize,
}

impl ContextConfig {
    /// Creates a configuration with no capabilities and a silent error hook.
    pub fn new() -> Self {
        Self {
            requirements: Requirements::default(),
            step: None,
            error: Arc::new(|_: ErrorKind, _: i32| {}),
            priority: Priority::Normal,
            stack_size: 0,
            wait_for_guard: Duration::from_millis(100),
            queue_size: 0,
            queue_element_size: 0,
        }
    }

    /// Requests a cooperative step slot on a shared runtime.
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.requirements.runtime = true;
        self.step = Some(Arc::new(step));
        self
    }

    /// Requests a cooperative step slot on an exclusive runtime.
    pub fn with_separate_step(mut self, step: impl Step + 'static) -> Self {
        self.requirements.runtime_separate = true;
        self.step = Some(Arc::new(step));
        self
    }

    /// Requests a re-entrant guard with the given acquisition timeout.
    pub fn with_guard(mut self, wait: Duration) -> Self {
        self.requirements.guard = true;
        self.wait_for_guard = wait;
        self
    }

    /// Requests a coalescing signal flag.
    pub fn with_signal(mut self) -> Self {
        self.requirements.signal = true;
        self
    }

    /// Requests a bounded queue of `size` elements of `element_size` bytes.
    pub fn with_queue(mut self, size: usize, element_size: usize) -> Self {
        self.requirements.queue = true;
        self.queue_size = size;
        self.queue_element_size = element_size;
        self
    }

    /// Starts the context disabled; resources are allocated on `enable`.
    pub fn start_disabled(mut self) -> Self {
        self.requirements.start_disabled = true;
        self
    }

    /// Sets the priority band.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the requested stack size for the hosting runtime's task.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Installs the error hook.
    pub fn on_error(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.error = Arc::new(hook);
        self
    }

    /// Checks the capability/field consistency rules.
    ///
    /// A step must be present exactly when a runtime capability is set, a
    /// guard needs a non-zero wait timeout, and a queue needs a non-zero
    /// capacity and element size.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.requirements.wants_runtime() != self.step.is_some() {
            return Err(Error::InvalidParameter);
        }
        if self.requirements.guard && self.wait_for_guard.is_zero() {
            return Err(Error::InvalidParameter);
        }
        if self.requirements.queue && (self.queue_size == 0 || self.queue_element_size == 0) {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend resources owned by an enabled context.
///
/// Allocated on each disabled-to-enabled transition, released on the
/// reverse one.
pub(crate) struct Resources {
    /// Readiness semaphore; a pending count means this context has work.
    pub(crate) ready: Arc<dyn Semaphore>,
    /// Re-entrant guard lock, present iff the `guard` capability was set.
    pub(crate) guard: Option<Arc<dyn GuardLock>>,
    /// Bounded payload queue, present iff the `queue` capability was set.
    pub(crate) queue: Option<Arc<dyn PayloadQueue>>,
}

/// Internal record of one registered context.
pub(crate) struct Context {
    pub(crate) id: usize,
    pub(crate) config: ContextConfig,
    enabled: AtomicBool,
    /// Coalescing signal state: set by `signal`, cleared by the check
    /// calls. Multiple posts before a check collapse to "at least one".
    signal_pending: AtomicBool,
    resources: Mutex<Option<Resources>>,
    runtime: Mutex<Option<Arc<RuntimeShared>>>,
}

impl Context {
    pub(crate) fn new(id: usize, config: ContextConfig) -> Self {
        Self {
            id,
            config,
            enabled: AtomicBool::new(false),
            signal_pending: AtomicBool::new(false),
            resources: Mutex::new(None),
            runtime: Mutex::new(None),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn set_runtime(&self, runtime: Arc<RuntimeShared>) {
        *self.runtime.lock().unwrap() = Some(runtime);
    }

    pub(crate) fn runtime(&self) -> Option<Arc<RuntimeShared>> {
        self.runtime.lock().unwrap().clone()
    }

    /// Allocates the backend resources this context's capability set calls
    /// for. A failure part-way through drops whatever was built so far and
    /// leaves the context without resources.
    pub(crate) fn allocate_resources(&self, backend: &dyn Backend) -> Result<()> {
        let ready = backend.create_semaphore()?;
        let guard = if self.config.requirements.guard {
            Some(backend.create_guard()?)
        } else {
            None
        };
        let queue = if self.config.requirements.queue {
            Some(backend.create_queue(self.config.queue_size, self.config.queue_element_size)?)
        } else {
            None
        };

        self.signal_pending.store(false, Ordering::Release);
        *self.resources.lock().unwrap() = Some(Resources {
            ready,
            guard,
            queue,
        });
        Ok(())
    }

    pub(crate) fn free_resources(&self) {
        *self.resources.lock().unwrap() = None;
    }

    /// Readiness semaphore of an enabled context, if resources exist.
    pub(crate) fn ready_semaphore(&self) -> Option<Arc<dyn Semaphore>> {
        self.resources
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.ready.clone())
    }

    fn guard_lock(&self) -> Result<Arc<dyn GuardLock>> {
        if !self.config.requirements.guard {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled() {
            return Err(Error::InvalidState);
        }
        self.resources
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|r| r.guard.clone())
            .ok_or(Error::InvalidState)
    }

    fn payload_queue(&self) -> Result<Arc<dyn PayloadQueue>> {
        if !self.config.requirements.queue {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled() {
            return Err(Error::InvalidState);
        }
        self.resources
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|r| r.queue.clone())
            .ok_or(Error::InvalidState)
    }

    /// Marks this context ready and wakes its hosting runtime, if any.
    fn kick(&self) {
        if let Some(ready) = self.ready_semaphore() {
            ready.give();
        }
        if let Some(runtime) = self.runtime() {
            runtime.wake.give();
        }
    }

    /// Runs the step callback to completion on the caller's stack.
    pub(crate) fn run_step(&self) {
        if let Some(step) = &self.config.step {
            step.run();
        }
    }

    /// Reports a failure through the error hook.
    pub(crate) fn report(&self, kind: ErrorKind, status: i32) {
        self.config.error.on_error(kind, status);
    }

    pub(crate) fn proceed(&self) -> Result<()> {
        if !self.config.requirements.wants_runtime() {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled() {
            return Err(Error::InvalidState);
        }
        self.kick();
        Ok(())
    }

    pub(crate) fn acquire(&self) -> Result<()> {
        let guard = self.guard_lock()?;
        if guard.acquire(Some(self.config.wait_for_guard)) {
            Ok(())
        } else {
            Err(Error::Failed)
        }
    }

    pub(crate) fn release(&self) -> Result<()> {
        let guard = self.guard_lock()?;
        if guard.release() {
            Ok(())
        } else {
            Err(Error::Failed)
        }
    }

    pub(crate) fn signal(&self) -> Result<()> {
        if !self.config.requirements.signal {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled() {
            return Err(Error::InvalidState);
        }
        self.signal_pending.store(true, Ordering::Release);
        self.kick();
        Ok(())
    }

    pub(crate) fn signal_check(&self) -> Result<bool> {
        if !self.config.requirements.signal {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled() {
            return Err(Error::InvalidState);
        }
        Ok(self.signal_pending.swap(false, Ordering::AcqRel))
    }

    pub(crate) fn signal_check_and_acquire(&self) -> Result<bool> {
        if !self.config.requirements.signal {
            return Err(Error::NotSupported);
        }
        // Guard first: when a signal is observed, the guard is already held
        // and the caller must release it.
        let guard = self.guard_lock()?;
        if !guard.acquire(Some(self.config.wait_for_guard)) {
            return Err(Error::Failed);
        }
        if self.signal_pending.swap(false, Ordering::AcqRel) {
            Ok(true)
        } else {
            guard.release();
            Ok(false)
        }
    }

    pub(crate) fn queue_push(&self, data: &[u8]) -> Result<()> {
        let queue = self.payload_queue()?;
        queue.push(data)?;
        self.kick();
        Ok(())
    }

    pub(crate) fn queue_read(&self, out: &mut [u8]) -> Result<usize> {
        let queue = self.payload_queue()?;
        queue.read(out)
    }

    pub(crate) fn queue_read_and_acquire(&self, out: &mut [u8]) -> Result<usize> {
        let queue = self.payload_queue()?;
        let guard = self.guard_lock()?;
        if !guard.acquire(Some(self.config.wait_for_guard)) {
            return Err(Error::Failed);
        }
        match queue.read(out) {
            Ok(size) => Ok(size),
            Err(err) => {
                guard.release();
                Err(err)
            }
        }
    }
}

/// Cloneable handle to a registered context.
///
/// Returned by [`Adaptor::create_context`] and used for every subsequent
/// façade operation. Handles stay valid for the process lifetime; contexts
/// are never destroyed, only disabled.
///
/// [`Adaptor::create_context`]: crate::Adaptor::create_context
#[derive(Clone)]
pub struct ContextHandle {
    pub(crate) shared: Arc<AdaptorShared>,
    pub(crate) id: usize,
}

impl ContextHandle {
    /// Enables the context, allocating its backend resources and starting
    /// its hosting runtime's task if necessary.
    ///
    /// If the context requested a guard, the guard is acquired on behalf of
    /// the caller, who must release it.
    pub fn enable(&self) -> Result<()> {
        self.shared.enable(self.id, true)
    }

    /// Disables the context and frees its backend resources.
    ///
    /// If this was the last enabled member of its runtime, the runtime's
    /// backing task is torn down; the runtime itself and its member list
    /// survive for a later re-enable.
    pub fn disable(&self) -> Result<()> {
        self.shared.enable(self.id, false)
    }

    /// Whether the context is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.shared
            .context(self.id)
            .map(|ctx| ctx.is_enabled())
            .unwrap_or(false)
    }

    /// Re-triggers this context's dispatch without going through the
    /// signal or queue paths.
    pub fn proceed(&self) -> Result<()> {
        self.shared.context(self.id)?.proceed()
    }

    /// Acquires the re-entrant guard, blocking up to the configured
    /// `wait_for_guard`. Timeout is a soft failure ([`Error::Failed`]).
    ///
    /// Must not be called from interrupt context; use [`signal`] or
    /// [`queue_push`] there instead.
    ///
    /// [`signal`]: Self::signal
    /// [`queue_push`]: Self::queue_push
    pub fn acquire(&self) -> Result<()> {
        self.shared.context(self.id)?.acquire()
    }

    /// Releases the re-entrant guard.
    pub fn release(&self) -> Result<()> {
        self.shared.context(self.id)?.release()
    }

    /// Posts the signal flag and wakes the hosting runtime.
    ///
    /// Callable from any execution context, including interrupt handlers.
    /// Signals carry no payload and coalesce: posting N times before a
    /// check is observed as "at least one event pending", not as N events.
    pub fn signal(&self) -> Result<()> {
        self.shared.context(self.id)?.signal()
    }

    /// Non-blocking check-and-clear of the signal flag.
    ///
    /// Intended to be called from the step function.
    pub fn signal_check(&self) -> Result<bool> {
        self.shared.context(self.id)?.signal_check()
    }

    /// Like [`signal_check`], but on observing a signal the guard is held
    /// and must be released by the caller.
    ///
    /// [`signal_check`]: Self::signal_check
    pub fn signal_check_and_acquire(&self) -> Result<bool> {
        self.shared.context(self.id)?.signal_check_and_acquire()
    }

    /// Pushes one element into the bounded queue and wakes the hosting
    /// runtime.
    ///
    /// Callable from any execution context, including interrupt handlers.
    /// `data` must be exactly `queue_element_size` bytes. A full queue
    /// fails fast with [`Error::QueueFull`]; the element is dropped, never
    /// blocked on.
    pub fn queue_push(&self, data: &[u8]) -> Result<()> {
        self.shared.context(self.id)?.queue_push(data)
    }

    /// Pops the oldest un-read element into `out`, returning its size.
    ///
    /// Never blocks; an empty queue returns [`Error::QueueEmpty`].
    /// Intended to be called from the step function.
    pub fn queue_read(&self, out: &mut [u8]) -> Result<usize> {
        self.shared.context(self.id)?.queue_read(out)
    }

    /// Like [`queue_read`], but on a successful read the guard is held and
    /// must be released by the caller.
    ///
    /// [`queue_read`]: Self::queue_read
    pub fn queue_read_and_acquire(&self, out: &mut [u8]) -> Result<usize> {
        self.shared.context(self.id)?.queue_read_and_acquire(out)
    }
}
