use super::pipeline::StageFactory;
use super::status::{Status, UpdateStatus};
use super::{Action, ActionProcessor, Stoppable};
use crate::event::Subscription;
use crate::time::Instant;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::pipeline::StageHandle;

struct Shared {
    processor: ActionProcessor,
    pending: VecDeque<StageFactory>,
    running: Option<(StageHandle, Subscription<Status>)>,
    stopped: bool,
}

impl Shared {
    fn run_next(this: &Rc<RefCell<Shared>>) {
        loop {
            let factory_call = {
                let mut inner = this.borrow_mut();
                if inner.stopped || inner.running.is_some() {
                    return;
                }
                match inner.pending.pop_front() {
                    Some(mut factory) => {
                        let processor = inner.processor.clone();
                        factory(&processor)
                    }
                    None => return,
                }
            };
            match factory_call {
                Some(handle) => {
                    let weak = Rc::downgrade(this);
                    let sub = handle.subscribe(Box::new(move |_status: &Status| {
                        // Outcomes of individual stages are intentionally
                        // ignored: `ActionsQueue` is resilient to failures
                        // of independent queued operations (`spec.md` §4.3).
                        if let Some(strong) = weak.upgrade() {
                            strong.borrow_mut().running = None;
                            Shared::run_next(&strong);
                        }
                    }));
                    this.borrow_mut().running = Some((handle, sub));
                    return;
                }
                None => {
                    // Construction itself failed; this stage never ran, try
                    // the next queued one without ever producing a status.
                    continue;
                }
            }
        }
    }
}

/// FIFO of stage factories, serialized; at most one running at a time.
///
/// Unlike [`super::Pipeline`], individual stage outcomes never terminate the
/// queue: writes submitted to a modem driver's operation queue must keep
/// flowing even if one of them times out. The queue itself only ever
/// terminates by being stopped.
pub struct ActionsQueue {
    shared: Rc<RefCell<Shared>>,
}

impl ActionsQueue {
    pub fn new(processor: ActionProcessor) -> ActionsQueue {
        ActionsQueue {
            shared: Rc::new(RefCell::new(Shared {
                processor,
                pending: VecDeque::new(),
                running: None,
                stopped: false,
            })),
        }
    }

    /// Enqueues a stage; if nothing is currently running, it starts
    /// immediately (on this call, not on the next tick — the constructed
    /// action itself still won't be ticked until the next `tick`, per the
    /// scheduler's spawn-on-tick rule).
    pub fn push(&self, factory: StageFactory) {
        {
            let mut inner = self.shared.borrow_mut();
            if inner.stopped {
                return;
            }
            inner.pending.push_back(factory);
        }
        Shared::run_next(&self.shared);
    }

    pub fn pending_len(&self) -> usize {
        self.shared.borrow().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.borrow().running.is_some()
    }
}

impl Action for ActionsQueue {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        let stopped = self.shared.borrow().stopped;
        if stopped && self.shared.borrow().running.is_none() {
            UpdateStatus::Stop
        } else {
            UpdateStatus::Nothing
        }
    }
}

impl Stoppable for ActionsQueue {
    fn stop(&mut self) {
        let mut inner = self.shared.borrow_mut();
        inner.stopped = true;
        inner.pending.clear();
        if let Some((handle, _sub)) = &inner.running {
            handle.stop();
        }
    }
}
