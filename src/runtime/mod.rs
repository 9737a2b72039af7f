//! Runtime subsystem modules.

mod core;
pub(crate) mod registry;
pub(crate) mod scheduler;

pub(crate) use self::core::RuntimeShared;
pub(crate) use registry::RuntimeRegistry;
