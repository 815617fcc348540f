#![allow(dead_code)]

use std::sync::Once;

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    })
}

/// Runs `processor.tick()` up to `max_ticks` times, stopping early once
/// `done` reports true. Used instead of a real sleep loop since every action
/// in this crate advances on a scheduler tick, not on wall-clock time.
pub fn run_until<F>(processor: &linkcore::action::ActionProcessor, max_ticks: u32, mut done: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..max_ticks {
        if done() {
            return;
        }
        processor.tick(linkcore::time::Instant::now());
    }
    assert!(done(), "condition not satisfied within {max_ticks} ticks");
}
