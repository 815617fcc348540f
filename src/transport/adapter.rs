//! `Adapter`: resolves a `UnifiedAddress` into one builder action per
//! endpoint (`spec.md` §4.10).

use super::channel::{Channel, TransportBuilderAction};
use crate::action::{ActionPtr, ActionProcessor, Status};
use crate::address::{Endpoint, UnifiedAddress};
use crate::dns::Resolver;
use crate::error::LinkError;
use crate::event::Subscription;
use crate::modem::ValueAction;
use std::cell::RefCell;
use std::rc::Rc;

/// One builder action per endpoint a `UnifiedAddress` resolved to.
pub type AdapterAction = ValueAction<Vec<ActionPtr<TransportBuilderAction>>>;

/// Owns a DNS resolver and a channel factory; turns a `UnifiedAddress` into
/// a list of transport builder actions, one per resolved endpoint. On a
/// literal address, resolution is skipped and the factory runs immediately.
pub struct Adapter {
    processor: ActionProcessor,
    resolver: Rc<dyn Resolver>,
    channel_factory: Rc<dyn Fn(Endpoint) -> Rc<dyn Channel>>,
    pending_subs: RefCell<Vec<Subscription<Status>>>,
}

impl Adapter {
    pub fn new(
        processor: ActionProcessor,
        resolver: Rc<dyn Resolver>,
        channel_factory: impl Fn(Endpoint) -> Rc<dyn Channel> + 'static,
    ) -> Adapter {
        Adapter {
            processor,
            resolver,
            channel_factory: Rc::new(channel_factory),
            pending_subs: RefCell::new(Vec::new()),
        }
    }

    /// `AddressResolve -> BuildersCreate -> Completed`. On `Named`
    /// addresses, invokes the DNS resolver and builds one builder per
    /// resulting address; on `Literal` addresses, builds directly.
    pub fn create_transport(&self, address: UnifiedAddress) -> ActionPtr<AdapterAction> {
        let (action, resolver_handle) = AdapterAction::new_handle();
        let ptr = self.processor.spawn(action);

        match address {
            UnifiedAddress::Literal(addr) => {
                let endpoint: Endpoint = addr.into();
                let channel = (self.channel_factory)(endpoint);
                let builder = channel.transport_builder(&self.processor);
                resolver_handle.resolve(vec![builder]);
            }
            UnifiedAddress::Named(name) => {
                let resolve_ptr = self.resolver.resolve(&self.processor, &name);
                let resolve_ptr2 = resolve_ptr.clone();
                let processor = self.processor.clone();
                let channel_factory = self.channel_factory.clone();
                let name_for_error = name.name.clone();
                let sub = resolve_ptr.on_status(move |status| match status {
                    Status::Result => {
                        let addrs = resolve_ptr2.borrow().addresses().to_vec();
                        let builders: Vec<_> = addrs
                            .into_iter()
                            .map(|a| {
                                let endpoint: Endpoint = a.into();
                                let channel = (channel_factory)(endpoint);
                                channel.transport_builder(&processor)
                            })
                            .collect();
                        resolver_handle.resolve(builders);
                    }
                    Status::Error(_) => resolver_handle.fail(LinkError::ResolveFailed {
                        name: name_for_error.clone(),
                    }),
                    Status::Stop => resolver_handle.fail(LinkError::Stopped),
                });
                self.pending_subs.borrow_mut().push(sub);
            }
        }

        ptr
    }
}
