//! Adaptor façade: context creation, lifecycle, and the two-phase startup.
//!
//! The adaptor owns the backend strategy, the runtime registry, and the
//! arena of every registered context. Consumers create contexts during the
//! pre-start phase, call [`Adaptor::complete`] once, and from then on talk
//! to their contexts through [`ContextHandle`] operations.

use crate::backend::{self, Backend, BackendKind};
use crate::context::{Context, ContextConfig, ContextHandle};
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::RuntimeRegistry;

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// State shared between the adaptor and every handle it hands out.
pub(crate) struct AdaptorShared {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) registry: RuntimeRegistry,
    /// Context arena; contexts are referenced by stable index and never
    /// removed.
    contexts: Mutex<Vec<Arc<Context>>>,
    started: AtomicBool,
    ready_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl AdaptorShared {
    pub(crate) fn context(&self, id: usize) -> Result<Arc<Context>> {
        self.contexts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(Error::InvalidHandle)
    }

    pub(crate) fn enable(&self, id: usize, enable: bool) -> Result<()> {
        let context = self.context(id)?;
        self.registry.enable(self.backend.as_ref(), &context, enable)
    }
}

/// Portable concurrency multiplexer.
///
/// Lets many independent components share a small number of backing OS
/// tasks. Each component registers one context with a declared capability
/// set; contexts of equal priority share one runtime task and are
/// dispatched round-robin.
///
/// # Startup contract
///
/// Startup is two-phase: every [`create_context`] call must happen before
/// [`complete`], on one thread (this is a documented precondition, not a
/// checked invariant). `complete` starts the runtime tasks and fires the
/// ready hook once; after that the handle operations are valid from any
/// execution context they individually allow.
///
/// # Example
/// ```ignore
/// let adaptor = Adaptor::new();
/// let worker = adaptor.create_context(
///     ContextConfig::new().with_step(|| pump_events()).with_signal(),
/// )?;
/// adaptor.complete();
/// worker.signal()?;
/// ```
///
/// [`create_context`]: Self::create_context
/// [`complete`]: Self::complete
pub struct Adaptor {
    shared: Arc<AdaptorShared>,
}

impl Adaptor {
    /// Creates an adaptor on the default (threads) backend.
    ///
    /// Use [`AdaptorBuilder`] to pick a different backend or install a
    /// ready hook.
    ///
    /// [`AdaptorBuilder`]: crate::AdaptorBuilder
    pub fn new() -> Self {
        Self::with_backend(BackendKind::default(), None)
    }

    pub(crate) fn with_backend(
        kind: BackendKind,
        ready_hook: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            shared: Arc::new(AdaptorShared {
                backend: backend::create(kind),
                registry: RuntimeRegistry::new(),
                contexts: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                ready_hook: Mutex::new(ready_hook),
            }),
        }
    }

    /// Registers a new context.
    ///
    /// Validates the configuration, copies it verbatim into the context
    /// record, allocates backend resources immediately unless
    /// `start_disabled` was requested, and joins the context to its
    /// hosting runtime when a runtime capability is set. On an allocation
    /// failure the partially built context is rolled back, the failure is
    /// reported once through the error hook, and the error is returned.
    ///
    /// Must only be called during the pre-start phase.
    ///
    /// # Returns
    /// A cloneable handle used for every subsequent operation.
    pub fn create_context(&self, config: ContextConfig) -> Result<ContextHandle> {
        config.validate()?;

        let shared = &self.shared;
        let mut contexts = shared.contexts.lock().unwrap();
        let id = contexts.len();
        let context = Arc::new(Context::new(id, config));

        if !context.config.requirements.start_disabled {
            context
                .allocate_resources(shared.backend.as_ref())
                .inspect_err(|_| context.report(ErrorKind::RuntimeInitFailed, 0))?;
            context.set_enabled(true);
        }

        if context.config.requirements.wants_runtime()
            && let Err(err) = shared.registry.register(shared.backend.as_ref(), &context)
        {
            context.set_enabled(false);
            context.free_resources();
            context.report(ErrorKind::RuntimeInitFailed, 0);
            return Err(err);
        }

        debug!("registered context {id}");
        contexts.push(context);
        Ok(ContextHandle {
            shared: self.shared.clone(),
            id,
        })
    }

    /// Finishes the registration phase.
    ///
    /// Starts the backing task of every enabled runtime (task-creation
    /// failures are reported through each member's error hook) and fires
    /// the ready hook, once per process no matter how often `complete` is
    /// called.
    pub fn complete(&self) {
        self.shared.registry.complete(self.shared.backend.as_ref());
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            debug!("adaptor ready ({} backend)", self.shared.backend.name());
            if let Some(hook) = self.shared.ready_hook.lock().unwrap().take() {
                hook();
            }
        }
    }

    /// Dispatches every currently-ready context once on the caller's
    /// thread and returns how many steps ran.
    ///
    /// This is how the cooperative backend is driven; on the preemptive
    /// backends the backing tasks dispatch on their own and this call is
    /// only useful before [`complete`](Self::complete).
    pub fn run_pending(&self) -> usize {
        self.shared.registry.run_pending()
    }

    /// Number of runtimes created so far. Diagnostic.
    pub fn runtime_count(&self) -> usize {
        self.shared.registry.runtime_count()
    }

    /// Stops and joins every backing runtime task.
    ///
    /// Contexts and runtimes stay registered, the registry never shrinks,
    /// but nothing is dispatched until a context is enabled again.
    pub fn shutdown(&self) {
        self.shared.registry.shutdown();
    }
}

impl Default for Adaptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Adaptor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
