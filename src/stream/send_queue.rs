use super::StreamWriteAction;
use crate::action::{Action, ActionPtr, ActionProcessor, Stoppable, UpdateStatus};
use crate::error::LinkError;
use crate::time::Instant;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// The minimal socket surface [`SendQueueManager`] needs: a non-blocking
/// send returning the three-way `spec.md` §4.5 result.
pub trait SocketPacketSendAction {
    fn send(&mut self, bytes: &[u8]) -> Option<usize>;
}

/// FIFO of pending writes over a single socket, at most one `InProgress` at
/// a time (`spec.md` §4.6).
///
/// `A`'s send is reached through a `RefCell`, not a `Mutex`: everything in
/// this crate runs on one cooperative thread, so the only reentrancy this
/// guards against is a `Send()` call nested inside another (tick calling in
/// while a `ReadyToWrite` callback for the same socket is already on the
/// stack), not cross-thread contention.
pub struct SendQueueManager<A> {
    socket: Rc<RefCell<A>>,
    pending: RefCell<VecDeque<ActionPtr<StreamWriteAction>>>,
    stopped: RefCell<bool>,
}

impl<A: SocketPacketSendAction + 'static> SendQueueManager<A> {
    pub fn new(socket: Rc<RefCell<A>>) -> SendQueueManager<A> {
        SendQueueManager {
            socket,
            pending: RefCell::new(VecDeque::new()),
            stopped: RefCell::new(false),
        }
    }

    /// Enqueues `data`; if nothing is in flight, attempts to send it
    /// immediately.
    pub fn push(
        &self,
        processor: &ActionProcessor,
        data: crate::buf::DataBuffer,
    ) -> ActionPtr<StreamWriteAction> {
        let ptr = processor.spawn(StreamWriteAction::new(data));
        if *self.stopped.borrow() {
            ptr.borrow_mut().stop();
            return ptr;
        }
        self.pending.borrow_mut().push_back(ptr.clone());
        self.try_progress();
        ptr
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Re-drives the head of the queue. Called on every scheduler tick and
    /// from the socket's `ReadyToWrite` callback; safe to call redundantly.
    pub fn try_progress(&self) {
        if *self.stopped.borrow() {
            return;
        }
        loop {
            let front = {
                let mut pending = self.pending.borrow_mut();
                while let Some(head) = pending.front() {
                    if head.is_finished() {
                        pending.pop_front();
                    } else {
                        break;
                    }
                }
                pending.front().cloned()
            };
            let Some(front) = front else { return };

            let mut socket = match self.socket.try_borrow_mut() {
                Ok(s) => s,
                Err(_) => return,
            };
            let outcome = {
                let action = front.borrow();
                if !action.is_pending() {
                    None
                } else {
                    Some(socket.send(action.remaining()))
                }
            };
            match outcome {
                None => return,
                Some(Some(0)) => return, // wait for ReadyToWrite
                Some(Some(n)) => {
                    front.borrow_mut().advance(n);
                    if front.is_finished() || !front.borrow().is_pending() {
                        // Sent fully; loop to start the next queued write.
                        continue;
                    }
                    return;
                }
                Some(None) => {
                    front
                        .borrow_mut()
                        .fail(LinkError::SendFailed("socket send failed".into()));
                    continue;
                }
            }
        }
    }
}

impl<A: SocketPacketSendAction + 'static> Action for SendQueueManager<A> {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        self.try_progress();
        if *self.stopped.borrow() && self.pending.borrow().is_empty() {
            UpdateStatus::Stop
        } else {
            UpdateStatus::Nothing
        }
    }
}

impl<A: SocketPacketSendAction + 'static> Stoppable for SendQueueManager<A> {
    fn stop(&mut self) {
        *self.stopped.borrow_mut() = true;
        for ptr in self.pending.borrow_mut().drain(..) {
            ptr.borrow_mut().stop();
        }
    }
}
