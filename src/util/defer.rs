//! Runs a closure when a scope exits, success or not.

/// Holds a closure that runs once, on drop, unless [`Defer::cancel`] was
/// called first. Used to guarantee cleanup (closing a descriptor, rolling
/// back a partial registration) on every exit path of a function, including
/// early returns via `?`.
pub struct Defer<F: FnOnce()> {
    callback: Option<F>,
}

/// Schedules `callback` to run when the returned [`Defer`] drops.
pub fn defer<F: FnOnce()>(callback: F) -> Defer<F> {
    Defer { callback: Some(callback) }
}

impl<F: FnOnce()> Defer<F> {
    /// Drops without running the closure.
    pub fn cancel(mut self) {
        self.callback = None;
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_on_drop() {
        let ran = Cell::new(false);
        {
            let _guard = defer(|| ran.set(true));
        }
        assert!(ran.get());
    }

    #[test]
    fn cancel_suppresses_the_call() {
        let ran = Cell::new(false);
        let guard = defer(|| ran.set(true));
        guard.cancel();
        assert!(!ran.get());
    }

    #[test]
    fn runs_on_early_return() {
        fn inner(ran: &Cell<bool>, fail: bool) -> Result<(), ()> {
            let _guard = defer(|| ran.set(true));
            if fail {
                return Err(());
            }
            Ok(())
        }

        let ran = Cell::new(false);
        let _ = inner(&ran, true);
        assert!(ran.get());
    }
}
