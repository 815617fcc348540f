//! Single- and multi-subscriber events with RAII unsubscribe.

mod subscription;

pub use subscription::Subscription;

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

type Slot<A> = (u64, Box<dyn FnMut(&A)>);

struct Inner<A> {
    next_id: u64,
    subscribers: Vec<Slot<A>>,
}

pub(crate) type InnerHandle<A> = Rc<RefCell<Inner<A>>>;

/// A single-producer, multi-consumer dispatch point.
///
/// Subscribers are boxed closures kept by value in a list, matching the
/// small-function adapter used everywhere else in this crate
/// ([`crate::callback::Callback`]) rather than trait objects with a vtable
/// the caller has to manage. [`Event::subscribe`] returns a [`Subscription`]
/// whose `Drop` removes the closure; nothing else can unsubscribe it.
pub struct Event<A> {
    inner: InnerHandle<A>,
}

impl<A> Default for Event<A> {
    fn default() -> Self {
        Event::new()
    }
}

impl<A> Clone for Event<A> {
    fn clone(&self) -> Self {
        Event {
            inner: self.inner.clone(),
        }
    }
}

impl<A> Event<A> {
    pub fn new() -> Event<A> {
        Event {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Registers `f` to be called on every future [`Event::emit`]. The
    /// returned [`Subscription`] must be kept alive for as long as the
    /// caller wants to keep receiving callbacks; dropping it unsubscribes.
    pub fn subscribe<F>(&self, f: F) -> Subscription<A>
    where
        F: FnMut(&A) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Box::new(f)));
        Subscription::new(id, self.inner.clone())
    }

    /// Invokes every live subscriber with `arg`, in registration order.
    ///
    /// The subscriber list is swapped out for the duration of the call so a
    /// subscriber may freely subscribe or unsubscribe (itself or another)
    /// from within its own callback without re-entering a borrowed
    /// `RefCell`.
    pub fn emit(&self, arg: &A) {
        let mut subscribers = mem::take(&mut self.inner.borrow_mut().subscribers);
        for (_, f) in subscribers.iter_mut() {
            f(arg);
        }
        let mut inner = self.inner.borrow_mut();
        subscribers.append(&mut inner.subscribers);
        inner.subscribers = subscribers;
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

pub(crate) fn unsubscribe<A>(inner: &InnerHandle<A>, id: u64) {
    if let Ok(mut inner) = inner.try_borrow_mut() {
        inner.subscribers.retain(|(sid, _)| *sid != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_emit() {
        let ev: Event<i32> = Event::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = ev.subscribe(move |v| seen2.borrow_mut().push(*v));
        ev.emit(&1);
        ev.emit(&2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn drop_unsubscribes() {
        let ev: Event<i32> = Event::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let sub = ev.subscribe(move |v| seen2.borrow_mut().push(*v));
        drop(sub);
        ev.emit(&1);
        assert!(seen.borrow().is_empty());
        assert_eq!(ev.subscriber_count(), 0);
    }
}
