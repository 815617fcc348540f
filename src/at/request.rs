use super::buffer::AtBuffer;
use super::dispatcher::AtDispatcher;
use super::listener::AtListener;
use super::support::AtWriteAction;
use crate::action::{Action, ActionPtr, Status, Stoppable, UpdateStatus};
use crate::error::LinkError;
use crate::time::{Duration, Instant};
use std::cell::RefCell;
use std::rc::Rc;

/// One named response a request waits for, each with its own timeout
/// (`spec.md` §4.8).
#[derive(Clone)]
pub struct Wait {
    prefix: String,
    timeout: Duration,
    handler: Option<Rc<RefCell<dyn FnMut(&AtBuffer, usize) -> bool>>>,
}

impl Wait {
    pub fn new(prefix: impl Into<String>, timeout: Duration) -> Wait {
        Wait {
            prefix: prefix.into(),
            timeout,
            handler: None,
        }
    }

    /// Installs a handler that inspects the matched line; returning `false`
    /// fails the whole request.
    pub fn with_handler<F>(mut self, f: F) -> Wait
    where
        F: FnMut(&AtBuffer, usize) -> bool + 'static,
    {
        self.handler = Some(Rc::new(RefCell::new(f)));
        self
    }
}

/// Exponential backoff between `AtRequest` retries
/// (`original_source/aether/modems/exponent_time.h`; additive per
/// `SPEC_FULL.md` §4). A single attempt with `max_attempts = 1` reproduces
/// the plain `spec.md` §4.8 behavior exactly.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            backoff_multiplier: 2,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let mut backoff = self.initial_backoff;
        for _ in 1..attempt {
            backoff = (backoff * self.backoff_multiplier).min(self.max_backoff);
        }
        backoff.min(self.max_backoff)
    }
}

struct WaitRuntime {
    deadline: Instant,
    satisfied: bool,
}

enum RequestState {
    MakeRequest,
    WaitResponse,
    RetryDelay(Instant),
    Success,
    Failed,
    Stopped,
}

struct Shared {
    issue: Box<dyn FnMut() -> ActionPtr<AtWriteAction>>,
    dispatcher: Rc<AtDispatcher>,
    wait_specs: Vec<Wait>,
    retry: RetryPolicy,
    attempt: u32,
    state: RequestState,
    failure: Option<LinkError>,
    write_sub: Option<crate::event::Subscription<Status>>,
    listeners: Vec<AtListener>,
    waits: Vec<WaitRuntime>,
}

impl Shared {
    fn start_attempt(this: &Rc<RefCell<Shared>>, now: Instant) {
        let write_ptr = {
            let mut inner = this.borrow_mut();
            inner.attempt += 1;
            inner.state = RequestState::MakeRequest;
            inner.listeners.clear();
            inner.waits.clear();
            (inner.issue)()
        };
        let weak = Rc::downgrade(this);
        let sub = write_ptr.on_status(move |status: &Status| {
            let Some(strong) = weak.upgrade() else { return };
            match status {
                Status::Result => Shared::enter_wait(&strong, now),
                Status::Error(e) => {
                    Shared::handle_failure(&strong, LinkError::SendFailed(e.to_string()), now)
                }
                Status::Stop => {
                    strong.borrow_mut().state = RequestState::Stopped;
                }
            }
        });
        this.borrow_mut().write_sub = Some(sub);
    }

    fn enter_wait(this: &Rc<RefCell<Shared>>, now: Instant) {
        let (specs, dispatcher) = {
            let inner = this.borrow();
            (inner.wait_specs.clone(), inner.dispatcher.clone())
        };

        let mut waits = Vec::with_capacity(specs.len());
        let mut listeners = Vec::with_capacity(specs.len() + 1);

        for (idx, spec) in specs.iter().enumerate() {
            let deadline = now.checked_add(spec.timeout).unwrap_or(now);
            waits.push(WaitRuntime {
                deadline,
                satisfied: false,
            });
            let weak = Rc::downgrade(this);
            let handler = spec.handler.clone();
            let listener = AtListener::new(dispatcher.clone(), spec.prefix.clone(), move |buf, line| {
                let ok = match &handler {
                    Some(h) => (h.borrow_mut())(buf, line),
                    None => true,
                };
                if let Some(strong) = weak.upgrade() {
                    Shared::observe(&strong, idx, ok);
                }
            });
            listeners.push(listener);
        }

        {
            let weak = Rc::downgrade(this);
            let error_listener = AtListener::new(dispatcher, "ERROR", move |_buf, _line| {
                if let Some(strong) = weak.upgrade() {
                    Shared::handle_failure(&strong, LinkError::AtError, now);
                }
            });
            listeners.push(error_listener);
        }

        let mut inner = this.borrow_mut();
        inner.state = RequestState::WaitResponse;
        inner.waits = waits;
        inner.listeners = listeners;
    }

    fn observe(this: &Rc<RefCell<Shared>>, idx: usize, ok: bool) {
        let mut inner = this.borrow_mut();
        if !matches!(inner.state, RequestState::WaitResponse) {
            return;
        }
        if !ok {
            inner.state = RequestState::Failed;
            inner.failure = Some(LinkError::AtParse("wait handler rejected response".into()));
            return;
        }
        if let Some(w) = inner.waits.get_mut(idx) {
            w.satisfied = true;
        }
        if inner.waits.iter().all(|w| w.satisfied) {
            inner.state = RequestState::Success;
        }
    }

    fn handle_failure(this: &Rc<RefCell<Shared>>, err: LinkError, now: Instant) {
        let should_retry = {
            let inner = this.borrow();
            matches!(inner.state, RequestState::MakeRequest | RequestState::WaitResponse)
                && inner.attempt < inner.retry.max_attempts
        };
        if should_retry {
            let mut inner = this.borrow_mut();
            inner.listeners.clear();
            inner.waits.clear();
            let backoff = inner.retry.backoff_for_attempt(inner.attempt);
            inner.state = RequestState::RetryDelay(now.checked_add(backoff).unwrap_or(now));
            inner.failure = Some(err);
        } else {
            let mut inner = this.borrow_mut();
            inner.state = RequestState::Failed;
            inner.failure = Some(err);
        }
    }
}

/// Issues one AT command and waits for zero or more named responses
/// (`spec.md` §4.8). Construct via [`AtRequest::new`] with an `issue`
/// closure that performs (or re-performs, on retry) the write.
pub struct AtRequest {
    shared: Rc<RefCell<Shared>>,
    started: bool,
}

impl AtRequest {
    pub fn new<F>(
        dispatcher: Rc<AtDispatcher>,
        issue: F,
        waits: Vec<Wait>,
        retry: RetryPolicy,
    ) -> AtRequest
    where
        F: FnMut() -> ActionPtr<AtWriteAction> + 'static,
    {
        AtRequest {
            shared: Rc::new(RefCell::new(Shared {
                issue: Box::new(issue),
                dispatcher,
                wait_specs: waits,
                retry,
                attempt: 0,
                state: RequestState::MakeRequest,
                failure: None,
                write_sub: None,
                listeners: Vec::new(),
                waits: Vec::new(),
            })),
            started: false,
        }
    }
}

impl Action for AtRequest {
    fn update(&mut self, now: Instant) -> UpdateStatus {
        if !self.started {
            self.started = true;
            Shared::start_attempt(&self.shared, now);
        }

        let mut earliest_timeout: Option<Instant> = None;
        let should_retry_now = {
            let inner = self.shared.borrow();
            match &inner.state {
                RequestState::WaitResponse => {
                    earliest_timeout = inner.waits.iter().filter(|w| !w.satisfied).map(|w| w.deadline).min();
                    false
                }
                RequestState::RetryDelay(until) => now >= *until,
                _ => false,
            }
        };

        if should_retry_now {
            Shared::start_attempt(&self.shared, now);
            return UpdateStatus::Nothing;
        }

        if let Some(deadline) = earliest_timeout {
            if now >= deadline {
                Shared::handle_failure(
                    &self.shared,
                    LinkError::AtTimeout {
                        expected: "pending wait".into(),
                    },
                    now,
                );
                return UpdateStatus::Nothing;
            }
        }

        let mut inner = self.shared.borrow_mut();
        match &mut inner.state {
            RequestState::MakeRequest => UpdateStatus::Nothing,
            RequestState::WaitResponse => UpdateStatus::Delay(earliest_timeout.unwrap_or(now)),
            RequestState::RetryDelay(until) => UpdateStatus::Delay(*until),
            RequestState::Success => UpdateStatus::Result,
            RequestState::Failed => UpdateStatus::Error(inner.failure.take().unwrap_or(LinkError::AtError)),
            RequestState::Stopped => UpdateStatus::Stop,
        }
    }
}

impl Stoppable for AtRequest {
    fn stop(&mut self) {
        let mut inner = self.shared.borrow_mut();
        inner.listeners.clear();
        inner.state = RequestState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionProcessor;

    fn make_write(processor: &ActionProcessor) -> ActionPtr<AtWriteAction> {
        processor.spawn(AtWriteAction::new())
    }

    #[test]
    fn succeeds_after_both_waits_observed() {
        let processor = ActionProcessor::new();
        let dispatcher = Rc::new(AtDispatcher::new());
        let buffer = Rc::new(RefCell::new(AtBuffer::new()));

        let request = processor.spawn(AtRequest::new(
            dispatcher.clone(),
            {
                let processor = processor.clone();
                move || make_write(&processor)
            },
            vec![
                Wait::new("+CREG", Duration::from_secs(5)),
                Wait::new("OK", Duration::from_secs(5)),
            ],
            RetryPolicy::default(),
        ));

        let mut now = Instant::now();
        processor.tick(now);

        {
            let mut buf = buffer.borrow_mut();
            buf.feed(b"+CREG: 2\r\n");
            let first_new = 0;
            dispatcher.on_buffer_update(&mut buf, first_new);
        }
        now = now + Duration::from_millis(10);
        processor.tick(now);
        assert!(!request.is_finished());

        {
            let mut buf = buffer.borrow_mut();
            buf.feed(b"OK\r\n");
            dispatcher.on_buffer_update(&mut buf, 0);
        }
        now = now + Duration::from_millis(10);
        processor.tick(now);
        assert!(request.is_finished());
    }

    #[test]
    fn times_out_when_no_response_arrives() {
        let processor = ActionProcessor::new();
        let dispatcher = Rc::new(AtDispatcher::new());

        let retry = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let request = processor.spawn(AtRequest::new(
            dispatcher,
            {
                let processor = processor.clone();
                move || make_write(&processor)
            },
            vec![Wait::new("OK", Duration::from_millis(5))],
            retry,
        ));

        let mut now = Instant::now();
        processor.tick(now);
        now = now + Duration::from_millis(50);
        let next = processor.tick(now);
        let _ = next;
        assert!(request.is_finished());
    }
}
