//! Cooperative single-threaded action scheduler.
//!
//! An [`Action`] is a user-defined type whose single step function,
//! `update`, returns an [`UpdateStatus`]. An [`ActionProcessor`] drives every
//! registered action forward one step per `tick`; nothing in this module
//! blocks the calling thread.

mod pipeline;
mod ptr;
mod queue;
mod registry;
mod status;
mod trigger;

pub use pipeline::{Pipeline, StageFactory, StageHandle};
pub use ptr::{ActionPtr, OwnActionPtr};
pub use queue::ActionsQueue;
pub use registry::ActionRegistry;
pub use status::{Status, UpdateStatus};
pub use trigger::ActionTrigger;

use crate::time::Instant;

/// A cooperative state-machine step unit.
///
/// Implementors must never block and must never panic on an expected
/// failure path; a logical failure is reported by returning
/// `UpdateStatus::Error`, not by unwinding.
pub trait Action: 'static {
    fn update(&mut self, now: Instant) -> UpdateStatus;
}

/// An [`Action`] that can be cooperatively cancelled.
///
/// `stop` must be idempotent: calling it more than once, or after the action
/// has already reached a terminal state, must not panic and must not cause
/// `update` to return `Stop` more than once.
pub trait Stoppable: Action {
    fn stop(&mut self);
}

/// Owns all actions registered against it and drives them forward.
///
/// This is `ActionProcessor` from `spec.md` §4.1: the registry plus the
/// driver loop. See [`ActionProcessor::tick`].
#[derive(Clone)]
pub struct ActionProcessor {
    registry: ActionRegistry,
    trigger: ActionTrigger,
}

impl ActionProcessor {
    pub fn new() -> ActionProcessor {
        ActionProcessor {
            registry: ActionRegistry::new(),
            trigger: ActionTrigger::new(),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn trigger(&self) -> ActionTrigger {
        self.trigger.clone()
    }

    /// Registers `action`, returning a shared handle to it. Per spec,
    /// actions spawned while a tick is in progress are appended here but
    /// are not part of the snapshot that tick is iterating, so they run
    /// for the first time on the *next* call to `tick`.
    pub fn spawn<T: Action>(&self, action: T) -> ActionPtr<T> {
        let (ptr, erased) = ptr::new_action(action);
        self.registry.push(erased);
        ptr
    }

    /// Advances every live action by one step and returns the next instant
    /// this processor should be woken at (see `spec.md` §4.1 for the exact
    /// fold rule). The host loop calls this, then waits on `trigger()` until
    /// that instant or an explicit `Trigger()`.
    pub fn tick(&self, now: Instant) -> Instant {
        let snapshot = self.registry.snapshot();
        let mut next_deadline = now;
        let mut any_delay = false;

        for entry in &snapshot {
            if entry.is_finished() {
                continue;
            }
            match entry.update(now) {
                UpdateStatus::Delay(t) => {
                    next_deadline = if any_delay {
                        crate::time::min_future(next_deadline, t)
                    } else {
                        t
                    };
                    any_delay = true;
                }
                UpdateStatus::Nothing => {}
                terminal => {
                    entry.finish(terminal);
                }
            }
        }

        self.registry.cleanup_finished();
        next_deadline
    }
}

impl Default for ActionProcessor {
    fn default() -> Self {
        ActionProcessor::new()
    }
}

pub(crate) use ptr::ErasedAction;
