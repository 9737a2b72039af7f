//! Fluent builder for Adaptor construction.
//!
//! Provides a builder pattern interface for creating and configuring
//! Adaptor instances.

use crate::adaptor::Adaptor;
use crate::backend::BackendKind;

/// Builder for constructing [`Adaptor`] instances with a fluent API.
///
/// Selects the backend strategy and optionally installs a hook that fires
/// once, when the registration phase completes.
///
/// # Example
/// ```ignore
/// let adaptor = AdaptorBuilder::new()
///     .backend(BackendKind::Parking)
///     .on_ready(|| println!("scheduler up"))
///     .build();
/// ```
pub struct AdaptorBuilder {
    kind: BackendKind,
    ready_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Default for AdaptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptorBuilder {
    /// Creates a new builder targeting the default (threads) backend.
    pub fn new() -> Self {
        Self {
            kind: BackendKind::default(),
            ready_hook: None,
        }
    }

    /// Selects the backend strategy.
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Installs a hook fired once, after the first [`Adaptor::complete`].
    ///
    /// [`Adaptor::complete`]: crate::Adaptor::complete
    pub fn on_ready(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.ready_hook = Some(Box::new(hook));
        self
    }

    /// Builds and returns the configured [`Adaptor`].
    pub fn build(self) -> Adaptor {
        Adaptor::with_backend(self.kind, self.ready_hook)
    }
}
