//! Error types for façade operations and error-hook classifications.
//!
//! Two layers exist side by side: [`Error`] is what fallible façade calls
//! return to their immediate caller, while [`ErrorKind`] classifies the
//! failures that are reported asynchronously through a context's error hook
//! (task or resource allocation going wrong during startup, guard
//! acquisition failing inside a combined operation).

use thiserror::Error;

/// Classification passed to a context's error hook.
///
/// Hook reports happen exactly once per failure and are never retried.
/// Soft failures (guard timeout, full queue) are *not* routed through the
/// hook; they come back to the caller as an [`Error`] instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A backend task, semaphore, lock, or queue could not be created.
    RuntimeInitFailed,
    /// A guard or backend primitive could not be acquired in time.
    AcquireFailed,
    /// A guard release was attempted by a non-owner or failed in the backend.
    ReleaseFailed,
}

/// Result code returned by façade operations.
///
/// Queue exhaustion and guard timeouts are deliberately plain result codes:
/// callers are expected to handle them inline, and nothing in this crate
/// treats them as fatal.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The handle does not refer to a registered context.
    #[error("handle does not refer to a registered context")]
    InvalidHandle,

    /// The configuration violates a capability/field consistency rule.
    #[error("invalid context configuration")]
    InvalidParameter,

    /// The capability needed by this operation was not requested at creation.
    #[error("capability was not requested for this context")]
    NotSupported,

    /// The context is not enabled (or the operation is out of phase).
    #[error("context is not in a state that allows this operation")]
    InvalidState,

    /// The queue already holds `queue_size` un-read elements; data was dropped.
    #[error("queue is full")]
    QueueFull,

    /// The queue holds no un-read elements.
    #[error("queue is empty")]
    QueueEmpty,

    /// A backend resource could not be allocated.
    #[error("backend resource allocation failed")]
    AllocationFailed,

    /// A backend primitive operation failed or timed out.
    #[error("backend primitive operation failed")]
    Failed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
