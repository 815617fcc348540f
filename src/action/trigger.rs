use crate::time::{Duration, Instant};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct Shared {
    mutex: Mutex<()>,
    condvar: Condvar,
    triggered: AtomicBool,
}

/// Shared signal object that wakes an outer `Wait`/`WaitUntil`.
///
/// This is the one cross-thread synchronization primitive in the whole
/// runtime that actually blocks (`spec.md` §5). A poller worker thread calls
/// [`ActionTrigger::trigger`] from inside a callback to wake the host's main
/// loop; the main loop calls [`ActionTrigger::wait_until`] between ticks.
#[derive(Clone)]
pub struct ActionTrigger {
    shared: Arc<Shared>,
}

impl ActionTrigger {
    pub fn new() -> ActionTrigger {
        ActionTrigger {
            shared: Arc::new(Shared {
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
                triggered: AtomicBool::new(false),
            }),
        }
    }

    /// Safe to call from any thread, including from inside a poller
    /// callback.
    pub fn trigger(&self) {
        self.shared.triggered.store(true, Ordering::SeqCst);
        let _guard = self.shared.mutex.lock().unwrap();
        self.shared.condvar.notify_all();
    }

    /// Blocks until either `trigger()` is called or `deadline` passes,
    /// whichever is first. Returns immediately without blocking if `trigger`
    /// was already called since the last `wait_until`.
    pub fn wait_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline <= now {
            self.shared.triggered.store(false, Ordering::SeqCst);
            return;
        }
        let timeout = deadline.duration_since(now);
        let guard = self.shared.mutex.lock().unwrap();
        if self.shared.triggered.swap(false, Ordering::SeqCst) {
            return;
        }
        let (_guard, _timeout_result) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |_| {
                !self.shared.triggered.load(Ordering::SeqCst)
            })
            .unwrap();
        self.shared.triggered.store(false, Ordering::SeqCst);
    }

    /// Merges `other` into `self` so that a signal on either wakes both.
    ///
    /// After merging, both handles share the same underlying `Shared`; this
    /// mirrors the "merge semantics" called out in `spec.md` §3 for
    /// `ActionTrigger`, used when two independently constructed subsystems
    /// (e.g. a host loop trigger and a poller's wake signal) need to be woken
    /// together.
    pub fn merge(&mut self, other: &ActionTrigger) {
        self.shared = other.shared.clone();
    }

}

impl Default for ActionTrigger {
    fn default() -> Self {
        ActionTrigger::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn trigger_wakes_waiter_early() {
        let trigger = ActionTrigger::new();
        let t2 = trigger.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            t2.trigger();
        });
        let start = Instant::now();
        trigger.wait_until(Instant::now() + Duration::from_secs(5));
        assert!(Instant::now().duration_since(start) < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn wait_until_past_deadline_returns_immediately() {
        let trigger = ActionTrigger::new();
        trigger.wait_until(Instant::now());
    }
}
