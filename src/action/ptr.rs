use super::status::{Status, UpdateStatus};
use super::{Action, Stoppable};
use crate::event::{Event, Subscription};
use crate::time::Instant;
use std::cell::RefCell;
use std::rc::Rc;

/// Type-erased entry stored in the [`super::ActionRegistry`].
///
/// The registry only needs to drive `update` and know when to reap an
/// entry; it never needs the concrete action type, so every `ActionCell<T>`
/// is stored behind this trait object.
pub(crate) trait ErasedAction {
    fn update(&self, now: Instant) -> UpdateStatus;
    fn is_finished(&self) -> bool;
    fn finish(&self, status: UpdateStatus);
}

struct ActionCell<T> {
    action: RefCell<T>,
    finished: RefCell<bool>,
    status_event: Event<Status>,
    finished_event: Event<()>,
}

impl<T: Action> ErasedAction for ActionCell<T> {
    fn update(&self, now: Instant) -> UpdateStatus {
        // Re-entrant `update` calls (an action triggering itself) are a
        // logic error in the caller; `try_borrow_mut` turns that into a
        // `Nothing` this tick rather than a panic.
        match self.action.try_borrow_mut() {
            Ok(mut action) => action.update(now),
            Err(_) => UpdateStatus::Nothing,
        }
    }

    fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    fn finish(&self, status: UpdateStatus) {
        if *self.finished.borrow() {
            return;
        }
        *self.finished.borrow_mut() = true;
        if let Some(s) = status.into_status() {
            #[cfg(feature = "log")]
            log::trace!("{} finished: {s:?}", std::any::type_name::<T>());
            self.status_event.emit(&s);
        }
        self.finished_event.emit(&());
    }
}

pub(crate) fn new_action<T: Action>(action: T) -> (ActionPtr<T>, Rc<dyn ErasedAction>) {
    let cell = Rc::new(ActionCell {
        action: RefCell::new(action),
        finished: RefCell::new(false),
        status_event: Event::new(),
        finished_event: Event::new(),
    });
    let ptr = ActionPtr { cell: cell.clone() };
    (ptr, cell as Rc<dyn ErasedAction>)
}

/// A reference-counted handle to a registered [`Action`].
///
/// Copying an `ActionPtr` shares ownership of the underlying action; the
/// registry entry stays alive until the action reaches a terminal state,
/// independent of how many `ActionPtr` clones a caller keeps or drops.
pub struct ActionPtr<T> {
    cell: Rc<ActionCell<T>>,
}

impl<T> Clone for ActionPtr<T> {
    fn clone(&self) -> Self {
        ActionPtr { cell: self.cell.clone() }
    }
}

impl<T: Action> ActionPtr<T> {
    pub fn is_finished(&self) -> bool {
        *self.cell.finished.borrow()
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        self.cell.action.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        self.cell.action.borrow_mut()
    }

    /// Subscribes to every terminal outcome.
    pub fn on_status<F>(&self, f: F) -> Subscription<Status>
    where
        F: FnMut(&Status) + 'static,
    {
        self.cell.status_event.subscribe(f)
    }

    /// Subscribes to `Result` only.
    pub fn on_result<F>(&self, mut f: F) -> Subscription<Status>
    where
        F: FnMut() + 'static,
    {
        self.on_status(move |s| {
            if let Status::Result = s {
                f()
            }
        })
    }

    /// Subscribes to `Error` only.
    pub fn on_error<F>(&self, mut f: F) -> Subscription<Status>
    where
        F: FnMut(&crate::error::LinkError) + 'static,
    {
        self.on_status(move |s| {
            if let Status::Error(e) = s {
                f(e.as_ref())
            }
        })
    }

    /// Subscribes to `Stop` only.
    pub fn on_stop<F>(&self, mut f: F) -> Subscription<Status>
    where
        F: FnMut() + 'static,
    {
        self.on_status(move |s| {
            if let Status::Stop = s {
                f()
            }
        })
    }

    /// Fires exactly once, strictly after the terminal status event.
    pub fn on_finished<F>(&self, f: F) -> Subscription<()>
    where
        F: FnMut(&()) + 'static,
    {
        self.cell.finished_event.subscribe(f)
    }
}

/// Unique-ownership wrapper for a [`Stoppable`] action.
///
/// Dropping an `OwnActionPtr` whose action has not yet reached a terminal
/// state calls [`Stoppable::stop`] on it, causing the action to terminate
/// cooperatively (typically at its next `update`). This is the only
/// automatic cancellation path in this crate: plain [`ActionPtr`] clones
/// never stop anything on drop.
pub struct OwnActionPtr<T: Stoppable> {
    ptr: ActionPtr<T>,
}

impl<T: Stoppable> OwnActionPtr<T> {
    pub fn new(ptr: ActionPtr<T>) -> OwnActionPtr<T> {
        OwnActionPtr { ptr }
    }

    pub fn get(&self) -> &ActionPtr<T> {
        &self.ptr
    }
}

impl<T: Stoppable> std::ops::Deref for OwnActionPtr<T> {
    type Target = ActionPtr<T>;
    fn deref(&self) -> &ActionPtr<T> {
        &self.ptr
    }
}

impl<T: Stoppable> Drop for OwnActionPtr<T> {
    fn drop(&mut self) {
        if !self.ptr.is_finished() {
            self.ptr.borrow_mut().stop();
        }
    }
}
