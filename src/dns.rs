//! DNS resolution is consumed only as an action contract (`spec.md` §1
//! Non-goals: "DNS resolver implementations ... consumed only as a
//! `NameAddress -> list<IpAddressPort>` action"). Nothing in this crate
//! performs a lookup; a host wires in a real resolver (c-ares, `getaddrinfo`,
//! LwIP) by implementing [`Resolver`].

use crate::action::{Action, ActionProcessor, ActionPtr, Stoppable, UpdateStatus};
use crate::address::{IpAddressPortProtocol, NameAddress};
use crate::error::LinkError;
use crate::time::Instant;
use std::cell::RefCell;
use std::rc::Rc;

enum Outcome {
    Pending,
    Result(Vec<IpAddressPortProtocol>),
    Error(LinkError),
    Stop,
}

/// An in-flight name resolution. A [`Resolver`] implementation spawns one of
/// these and resolves it (via [`ResolveAction::complete`]/[`ResolveAction::fail`])
/// whenever its own lookup mechanism finishes, synchronously or not.
pub struct ResolveAction {
    outcome: Rc<RefCell<Outcome>>,
    resolved: Vec<IpAddressPortProtocol>,
}

/// The write side of a [`ResolveAction`], handed to whatever drives the
/// actual lookup (e.g. a callback off a poller-backed getaddrinfo thread).
#[derive(Clone)]
pub struct ResolveHandle {
    outcome: Rc<RefCell<Outcome>>,
}

impl ResolveHandle {
    pub fn complete(&self, addresses: Vec<IpAddressPortProtocol>) {
        let mut outcome = self.outcome.borrow_mut();
        if matches!(*outcome, Outcome::Pending) {
            *outcome = Outcome::Result(addresses);
        }
    }

    pub fn fail(&self, err: LinkError) {
        let mut outcome = self.outcome.borrow_mut();
        if matches!(*outcome, Outcome::Pending) {
            *outcome = Outcome::Error(err);
        }
    }
}

impl ResolveAction {
    /// Creates a pending resolution and the handle used to complete it.
    pub fn new_pending() -> (ResolveAction, ResolveHandle) {
        let outcome = Rc::new(RefCell::new(Outcome::Pending));
        (
            ResolveAction {
                outcome: outcome.clone(),
                resolved: Vec::new(),
            },
            ResolveHandle { outcome },
        )
    }

    pub fn addresses(&self) -> &[IpAddressPortProtocol] {
        &self.resolved
    }
}

impl Action for ResolveAction {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        let taken = std::mem::replace(&mut *self.outcome.borrow_mut(), Outcome::Pending);
        match taken {
            Outcome::Pending => UpdateStatus::Nothing,
            Outcome::Result(addrs) => {
                self.resolved = addrs;
                UpdateStatus::Result
            }
            Outcome::Error(e) => UpdateStatus::Error(e),
            Outcome::Stop => UpdateStatus::Stop,
        }
    }
}

impl Stoppable for ResolveAction {
    fn stop(&mut self) {
        *self.outcome.borrow_mut() = Outcome::Stop;
    }
}

/// External collaborator that turns a [`NameAddress`] into zero or more
/// resolved addresses.
pub trait Resolver {
    fn resolve(&self, processor: &ActionProcessor, name: &NameAddress) -> ActionPtr<ResolveAction>;
}
