use super::ptr::ActionPtr;
use super::status::{Status, UpdateStatus};
use super::{Action, ActionProcessor, Stoppable};
use crate::error::LinkError;
use crate::event::Subscription;
use crate::time::Instant;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A type-erased view onto a registered stage action.
///
/// A stage runner hands back a [`StageHandle`] rather than an
/// [`ActionPtr<T>`] directly so [`Pipeline`] and [`super::ActionsQueue`] can
/// be generic over heterogeneous stage types (a DNS-resolve action followed
/// by a builder-create action, say) without boxing `dyn Action` itself.
pub struct StageHandle {
    subscribe_fn: Box<dyn Fn(Box<dyn FnMut(&Status)>) -> Subscription<Status>>,
    stop_fn: Option<Box<dyn Fn()>>,
}

impl StageHandle {
    /// Wraps a plain (non-stoppable) action handle.
    pub fn new<T: Action>(ptr: ActionPtr<T>) -> StageHandle {
        StageHandle {
            subscribe_fn: Box::new(move |f| ptr.on_status(f)),
            stop_fn: None,
        }
    }

    /// Wraps a stoppable action handle so a containing [`Pipeline`] or
    /// [`super::ActionsQueue`] can propagate its own `Stop()` into the
    /// currently running stage.
    pub fn new_stoppable<T: Stoppable>(ptr: ActionPtr<T>) -> StageHandle {
        let stop_ptr = ptr.clone();
        StageHandle {
            subscribe_fn: Box::new(move |f| ptr.on_status(f)),
            stop_fn: Some(Box::new(move || stop_ptr.borrow_mut().stop())),
        }
    }

    pub(super) fn subscribe(&self, f: Box<dyn FnMut(&Status)>) -> Subscription<Status> {
        (self.subscribe_fn)(f)
    }

    pub(super) fn stop(&self) -> bool {
        match &self.stop_fn {
            Some(stop) => {
                stop();
                true
            }
            None => false,
        }
    }
}

/// A thunk that constructs and registers one stage's action, given the
/// processor to register it with. Returning `None` means stage construction
/// itself failed (e.g. a channel had no builder to offer).
pub type StageFactory = Box<dyn FnMut(&ActionProcessor) -> Option<StageHandle>>;

enum Outcome {
    Running,
    Completed,
    Stopped,
    Failed(Rc<LinkError>),
}

struct Shared {
    processor: ActionProcessor,
    stages: Vec<StageFactory>,
    current_index: usize,
    outcome: Outcome,
    started: bool,
    current: Option<(StageHandle, Subscription<Status>)>,
}

impl Shared {
    fn start_stage(this: &Rc<RefCell<Shared>>, index: usize) {
        let factory_call = {
            let mut inner = this.borrow_mut();
            if index >= inner.stages.len() {
                inner.outcome = Outcome::Completed;
                return;
            }
            inner.current_index = index;
            let processor = inner.processor.clone();
            (inner.stages[index])(&processor)
        };
        let handle = match factory_call {
            Some(h) => h,
            None => {
                this.borrow_mut().outcome = Outcome::Failed(Rc::new(LinkError::PipelineStage {
                    stage: index,
                    source: Box::new(LinkError::NoViableChannel),
                }));
                return;
            }
        };

        let weak: Weak<RefCell<Shared>> = Rc::downgrade(this);
        let sub = handle.subscribe(Box::new(move |status: &Status| {
            let Some(strong) = weak.upgrade() else {
                return;
            };
            match status {
                Status::Result => {
                    let next = strong.borrow().current_index + 1;
                    Shared::start_stage(&strong, next);
                }
                Status::Error(e) => {
                    let idx = strong.borrow().current_index;
                    strong.borrow_mut().outcome = Outcome::Failed(Rc::new(LinkError::PipelineStage {
                        stage: idx,
                        source: Box::new(LinkError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            e.to_string(),
                        ))),
                    }));
                }
                Status::Stop => {
                    strong.borrow_mut().outcome = Outcome::Stopped;
                }
            }
        }));

        let mut inner = this.borrow_mut();
        inner.current = Some((handle, sub));
    }
}

/// Sequential composition of stages; short-circuits on the first non-Result
/// stage outcome (`spec.md` §4.3).
pub struct Pipeline {
    shared: Rc<RefCell<Shared>>,
}

impl Pipeline {
    pub fn new(processor: ActionProcessor, stages: Vec<StageFactory>) -> Pipeline {
        Pipeline {
            shared: Rc::new(RefCell::new(Shared {
                processor,
                stages,
                current_index: 0,
                outcome: Outcome::Running,
                started: false,
                current: None,
            })),
        }
    }

    /// Index of the stage currently running (or about to run).
    pub fn index(&self) -> usize {
        self.shared.borrow().current_index
    }
}

impl Action for Pipeline {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        let needs_start = !self.shared.borrow().started;
        if needs_start {
            self.shared.borrow_mut().started = true;
            Shared::start_stage(&self.shared, 0);
        }
        let inner = self.shared.borrow();
        match &inner.outcome {
            Outcome::Running => UpdateStatus::Nothing,
            Outcome::Completed => UpdateStatus::Result,
            Outcome::Stopped => UpdateStatus::Stop,
            Outcome::Failed(e) => UpdateStatus::Error(LinkError::PipelineStage {
                stage: inner.current_index,
                source: Box::new(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    e.to_string(),
                ))),
            }),
        }
    }
}

impl Stoppable for Pipeline {
    fn stop(&mut self) {
        let stopped_current = match &self.shared.borrow().current {
            Some((handle, _)) => handle.stop(),
            None => false,
        };
        if !stopped_current {
            let mut inner = self.shared.borrow_mut();
            inner.current = None;
            inner.outcome = Outcome::Stopped;
        }
    }
}
