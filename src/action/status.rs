use crate::error::LinkError;
use std::rc::Rc;

/// The only way an action signals progress or completion to the scheduler.
///
/// Returned from [`super::Action::update`] every tick. `Nothing` requests no
/// wake-up; `Delay(t)` asks to be woken no later than `t`; `Result`/`Error`/
/// `Stop` are the three terminal outcomes and are mutually exclusive with
/// each other and with any further `update` call.
#[derive(Debug)]
pub enum UpdateStatus {
    Nothing,
    Delay(crate::time::Instant),
    Result,
    Error(LinkError),
    Stop,
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateStatus::Result | UpdateStatus::Error(_) | UpdateStatus::Stop)
    }

    /// Consumes a terminal status into the broadcastable [`Status`], or
    /// `None` for `Nothing`/`Delay` which never reach subscribers.
    pub(crate) fn into_status(self) -> Option<Status> {
        match self {
            UpdateStatus::Result => Some(Status::Result),
            UpdateStatus::Error(e) => Some(Status::Error(Rc::new(e))),
            UpdateStatus::Stop => Some(Status::Stop),
            UpdateStatus::Nothing | UpdateStatus::Delay(_) => None,
        }
    }
}

/// The terminal kind delivered through an action's status event.
///
/// `Error` carries an `Rc<LinkError>` rather than a bare `LinkError` so the
/// same terminal value can be cheaply retained by both the emitting action
/// (e.g. a [`super::Pipeline`] remembering why it failed) and every
/// subscriber, without requiring `LinkError: Clone`.
#[derive(Debug, Clone)]
pub enum Status {
    Result,
    Error(Rc<LinkError>),
    Stop,
}
