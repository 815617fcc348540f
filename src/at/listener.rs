use super::buffer::AtBuffer;
use super::dispatcher::{AtDispatcher, AtObserver};
use std::cell::RefCell;
use std::rc::Rc;

struct Closure {
    f: RefCell<Box<dyn FnMut(&AtBuffer, usize)>>,
}

impl AtObserver for Closure {
    fn observe(&self, buffer: &AtBuffer, line_index: usize) {
        (self.f.borrow_mut())(buffer, line_index);
    }
}

/// RAII registration against an [`AtDispatcher`]: constructing registers the
/// closure for `prefix`, dropping removes it (`spec.md` §4.7). The closure
/// is kept alive by this listener, so it may be safely invoked for as long
/// as the listener has not been dropped.
pub struct AtListener {
    dispatcher: Rc<AtDispatcher>,
    observer: Rc<dyn AtObserver>,
}

impl AtListener {
    pub fn new<F>(dispatcher: Rc<AtDispatcher>, prefix: impl Into<String>, f: F) -> AtListener
    where
        F: FnMut(&AtBuffer, usize) + 'static,
    {
        let observer: Rc<dyn AtObserver> = Rc::new(Closure {
            f: RefCell::new(Box::new(f)),
        });
        dispatcher.register(prefix, observer.clone());
        AtListener {
            dispatcher,
            observer,
        }
    }
}

impl Drop for AtListener {
    fn drop(&mut self) {
        self.dispatcher.remove(&self.observer);
    }
}
