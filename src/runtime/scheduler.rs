//! Round-robin scheduler loop executed by each runtime's backing task.
//!
//! The task body blocks on the runtime's common wake semaphore. On wake it
//! scans the member list circularly, starting just after the last
//! dispatched member, and dispatches the first one whose readiness
//! semaphore can be taken without blocking. The cursor only ever advances
//! forward, so no member can starve the others sharing its runtime no
//! matter how often its own work becomes ready.

use crate::backend::{Pass, Runner};
use crate::context::Context;
use crate::runtime::RuntimeShared;

use log::trace;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub(crate) struct SchedulerRunner {
    runtime: Arc<RuntimeShared>,
}

impl SchedulerRunner {
    pub(crate) fn new(runtime: Arc<RuntimeShared>) -> Self {
        Self { runtime }
    }
}

impl Runner for SchedulerRunner {
    fn pass(&self, block: bool) -> Pass {
        let runtime = &self.runtime;

        let woken = if block {
            runtime.wake.take()
        } else {
            runtime.wake.try_take()
        };
        if !woken {
            return Pass::Idle;
        }
        if runtime.stop.load(Ordering::Acquire) {
            return Pass::Stopped;
        }

        match select_ready(runtime) {
            Some(context) => {
                trace!(
                    "runtime {} dispatching context {}",
                    runtime.index, context.id
                );
                // Member lock is released here; the step runs to completion
                // on this task's stack and may call back into the façade.
                context.run_step();
                Pass::Dispatched
            }
            None => Pass::Idle,
        }
    }
}

/// Scans the member list once, circularly from the cursor, and claims the
/// first ready member.
///
/// Disabled members are skipped without consuming their readiness. An
/// empty member list yields nothing; not expected in steady state.
fn select_ready(runtime: &RuntimeShared) -> Option<Arc<Context>> {
    let members = runtime.members.lock().unwrap();
    if members.is_empty() {
        return None;
    }

    let len = members.len();
    let start = runtime.cursor.load(Ordering::Relaxed) % len;
    for offset in 0..len {
        let index = (start + offset) % len;
        let context = &members[index];
        if !context.is_enabled() {
            continue;
        }
        let Some(ready) = context.ready_semaphore() else {
            continue;
        };
        if ready.try_take() {
            // The member may have been disabled between the enabled check
            // and the take. The claim then belongs to a context whose
            // disable already completed: put the token back and move on.
            if !context.is_enabled() {
                ready.give();
                continue;
            }
            // Round-robin guarantee: the next scan starts just after the
            // member being dispatched.
            runtime.cursor.store((index + 1) % len, Ordering::Relaxed);
            return Some(context.clone());
        }
    }
    None
}
