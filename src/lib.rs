//! Portable concurrency multiplexer for component-based applications.
//!
//! This crate lets many independent software components share a small
//! number of backing OS tasks while hiding what the platform underneath
//! looks like. Each component registers one context with a declared
//! capability set (an optional cooperative step slot, a re-entrant guard,
//! an interrupt-postable signal, an interrupt-postable bounded queue) and
//! contexts of equal priority are multiplexed onto one shared runtime task
//! with round-robin fairness.
//!
//! # Architecture
//!
//! - **Adaptor**: the façade; context creation, two-phase startup, handle
//!   operations
//! - **Context**: one component's scheduling and resource record
//! - **Runtime**: one shared backing task hosting a round-robin group of
//!   contexts of equal priority
//! - **Registry**: process-wide runtime list; grouping and enable/disable
//! - **Scheduler**: the per-runtime task body; wake, circular scan,
//!   dispatch
//! - **Backend**: strategy supplying semaphores, guard locks, queues,
//!   tasks, and the protected section; three implementations
//!   ([`BackendKind`])
//! - **AdaptorBuilder**: fluent builder pattern for adaptor instantiation

mod adaptor;
mod backend;
mod builder;
mod context;
mod error;
mod runtime;

pub use adaptor::Adaptor;
pub use backend::BackendKind;
pub use builder::AdaptorBuilder;
pub use context::{ContextConfig, ContextHandle, ErrorHook, Priority, Requirements, Step};
pub use error::{Error, ErrorKind, Result};
