use crate::action::{Action, Stoppable, UpdateStatus};
use crate::buf::DataBuffer;
use crate::event::Event;
use crate::time::Instant;
use std::collections::VecDeque;

/// Buffers socket recv callbacks and re-emits them in order on the next
/// `Update`, so a poller-thread-originated recv never re-enters a caller's
/// event handler synchronously (`spec.md` §4.6).
pub struct ReadAction {
    pending: VecDeque<DataBuffer>,
    out_event: Event<DataBuffer>,
    stopped: bool,
}

impl ReadAction {
    pub fn new() -> ReadAction {
        ReadAction {
            pending: VecDeque::new(),
            out_event: Event::new(),
            stopped: false,
        }
    }

    /// Enqueues a chunk to be delivered on the next tick. Call this from the
    /// underlying stream's recv callback.
    pub fn push(&mut self, data: DataBuffer) {
        self.pending.push_back(data);
    }

    pub fn out_data_event(&self) -> Event<DataBuffer> {
        self.out_event.clone()
    }
}

impl Default for ReadAction {
    fn default() -> Self {
        ReadAction::new()
    }
}

impl Action for ReadAction {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        while let Some(chunk) = self.pending.pop_front() {
            self.out_event.emit(&chunk);
        }
        if self.stopped {
            UpdateStatus::Stop
        } else {
            UpdateStatus::Nothing
        }
    }
}

impl Stoppable for ReadAction {
    fn stop(&mut self) {
        self.stopped = true;
    }
}
