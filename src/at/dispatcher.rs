use super::buffer::AtBuffer;
use std::cell::RefCell;
use std::rc::Rc;

/// Notified when its registered prefix is found in a dispatch window.
pub trait AtObserver {
    fn observe(&self, buffer: &AtBuffer, line_index: usize);
}

/// Routes newly arrived AT lines to at most one observer per update
/// (`spec.md` §4.7): first registered prefix that matches wins, others in
/// the same window are not consulted.
pub struct AtDispatcher {
    observers: RefCell<Vec<(String, Rc<dyn AtObserver>)>>,
}

impl AtDispatcher {
    pub fn new() -> AtDispatcher {
        AtDispatcher {
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Registers `observer` for `prefix`. A second registration for the
    /// same prefix string overwrites the first (last-wins).
    pub fn register(&self, prefix: impl Into<String>, observer: Rc<dyn AtObserver>) {
        let prefix = prefix.into();
        let mut observers = self.observers.borrow_mut();
        observers.retain(|(p, _)| *p != prefix);
        observers.push((prefix, observer));
    }

    /// Removes every registration whose observer is `observer` (pointer
    /// identity), regardless of prefix.
    pub fn remove(&self, observer: &Rc<dyn AtObserver>) {
        self.observers
            .borrow_mut()
            .retain(|(_, o)| !Rc::ptr_eq(o, observer));
    }

    /// Called whenever `buffer` gained new lines starting at `first_new`.
    /// Scans registered prefixes in registration order, notifies the first
    /// match, then trims everything strictly before the new window.
    pub fn on_buffer_update(&self, buffer: &mut AtBuffer, first_new: usize) {
        let snapshot: Vec<(String, Rc<dyn AtObserver>)> = self.observers.borrow().clone();
        let mut matched = false;
        for (prefix, observer) in &snapshot {
            if let Some(pos) = buffer.find_pattern(prefix, first_new) {
                #[cfg(feature = "log")]
                log::trace!("at dispatch: line {pos} matched prefix {prefix:?}");
                observer.observe(buffer, pos);
                matched = true;
                break;
            }
        }
        #[cfg(feature = "log")]
        if !matched && buffer.len() > first_new {
            log::trace!("at dispatch: no registered prefix matched the new window");
        }
        #[cfg(not(feature = "log"))]
        let _ = matched;
        buffer.erase_up_to(first_new);
    }
}

impl Default for AtDispatcher {
    fn default() -> Self {
        AtDispatcher::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recorder {
        seen: Rc<Cell<Option<usize>>>,
    }

    impl AtObserver for Recorder {
        fn observe(&self, _buffer: &AtBuffer, line_index: usize) {
            self.seen.set(Some(line_index));
        }
    }

    #[test]
    fn first_match_wins_and_others_are_skipped() {
        let dispatcher = AtDispatcher::new();
        let seen_a = Rc::new(Cell::new(None));
        let seen_b = Rc::new(Cell::new(None));
        dispatcher.register(
            "OK",
            Rc::new(Recorder {
                seen: seen_a.clone(),
            }),
        );
        dispatcher.register(
            "+CREG",
            Rc::new(Recorder {
                seen: seen_b.clone(),
            }),
        );

        let mut buffer = AtBuffer::new();
        buffer.feed(b"+CREG: 2\r\nOK\r\n");
        dispatcher.on_buffer_update(&mut buffer, 0);

        assert_eq!(seen_b.get(), Some(0));
        assert_eq!(seen_a.get(), None);
    }

    #[test]
    fn later_registration_for_same_prefix_overwrites_former() {
        let dispatcher = AtDispatcher::new();
        let seen_a = Rc::new(Cell::new(None));
        let seen_b = Rc::new(Cell::new(None));
        dispatcher.register(
            "OK",
            Rc::new(Recorder {
                seen: seen_a.clone(),
            }),
        );
        dispatcher.register(
            "OK",
            Rc::new(Recorder {
                seen: seen_b.clone(),
            }),
        );

        let mut buffer = AtBuffer::new();
        buffer.feed(b"OK\r\n");
        dispatcher.on_buffer_update(&mut buffer, 0);

        assert_eq!(seen_a.get(), None);
        assert_eq!(seen_b.get(), Some(0));
    }

    #[test]
    fn remove_drops_every_prefix_for_that_observer() {
        let dispatcher = AtDispatcher::new();
        let seen = Rc::new(Cell::new(None));
        let observer: Rc<dyn AtObserver> = Rc::new(Recorder { seen: seen.clone() });
        dispatcher.register("OK", observer.clone());
        dispatcher.remove(&observer);

        let mut buffer = AtBuffer::new();
        buffer.feed(b"OK\r\n");
        dispatcher.on_buffer_update(&mut buffer, 0);

        assert_eq!(seen.get(), None);
    }
}
