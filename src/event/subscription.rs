use super::{unsubscribe, InnerHandle};

/// Move-only RAII token returned by [`super::Event::subscribe`].
///
/// Dropping a `Subscription` removes its closure from the event; nothing
/// else can remove it early, and it is safe to drop more than once only in
/// the sense that a second drop never happens (the type is not `Clone`).
pub struct Subscription<A> {
    id: u64,
    inner: InnerHandle<A>,
    active: bool,
}

impl<A> Subscription<A> {
    pub(crate) fn new(id: u64, inner: InnerHandle<A>) -> Subscription<A> {
        Subscription {
            id,
            inner,
            active: true,
        }
    }

    /// Detaches the subscription so it outlives this handle: the closure
    /// keeps firing until the underlying [`super::Event`] itself is dropped.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl<A> Drop for Subscription<A> {
    fn drop(&mut self) {
        if self.active {
            unsubscribe(&self.inner, self.id);
        }
    }
}
