//! `ModemAccessPoint`/`ModemChannel`: a channel that reaches its endpoint
//! over a shared modem link (`spec.md` §4.10).

use super::channel::{Channel, ChannelProperties, ConnectionType, Reliability, TransportBuilderAction};
use crate::action::{ActionPtr, ActionProcessor, Status};
use crate::address::{Endpoint, EndpointAddress, Protocol};
use crate::at::SerialPort;
use crate::error::LinkError;
use crate::event::Subscription;
use crate::modem::{ModemCommandSet, ModemDriver, ModemTransport, ValueAction};
use crate::stream::ByteIStream;
use std::cell::RefCell;
use std::rc::Rc;

fn endpoint_parts(endpoint: &Endpoint) -> (Protocol, String, u16) {
    let host = match &endpoint.address {
        EndpointAddress::Ip(ip) => ip.to_string(),
        EndpointAddress::Named(name) => name.clone(),
    };
    (endpoint.protocol, host, endpoint.port)
}

/// Owns the single [`ModemDriver`] for a modem link. [`ModemAccessPoint::connect`]
/// is idempotent: concurrent callers before the first connect resolves all
/// share one underlying action, preventing two channels from racing to
/// initialize the same modem (`spec.md` §4.10, scenario S6).
pub struct ModemAccessPoint<P, C> {
    driver: Rc<ModemDriver<P, C>>,
    apn: String,
    connect_action: Rc<RefCell<Option<ActionPtr<ValueAction<()>>>>>,
    finish_sub: RefCell<Option<Subscription<()>>>,
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> ModemAccessPoint<P, C> {
    pub fn new(driver: Rc<ModemDriver<P, C>>, apn: impl Into<String>) -> ModemAccessPoint<P, C> {
        ModemAccessPoint {
            driver,
            apn: apn.into(),
            connect_action: Rc::new(RefCell::new(None)),
            finish_sub: RefCell::new(None),
        }
    }

    pub fn driver(&self) -> &Rc<ModemDriver<P, C>> {
        &self.driver
    }

    /// Returns the in-flight connect action, starting one if none is
    /// running. The field is cleared from within the action's own
    /// `FinishedEvent`, so the next `connect()` after completion starts a
    /// fresh attempt rather than replaying a stale result.
    pub fn connect(&self) -> ActionPtr<ValueAction<()>> {
        if let Some(existing) = self.connect_action.borrow().as_ref() {
            if !existing.is_finished() {
                return existing.clone();
            }
        }

        let action = self.driver.start(&self.apn);
        *self.connect_action.borrow_mut() = Some(action.clone());

        let slot = self.connect_action.clone();
        let sub = action.on_finished(move |_| {
            *slot.borrow_mut() = None;
        });
        *self.finish_sub.borrow_mut() = Some(sub);

        action
    }
}

/// A channel that reaches `address` over a shared [`ModemAccessPoint`].
///
/// `transport_builder` runs the three-stage pipeline from `spec.md` §4.10:
/// `ModemConnect` (deduplicated through the access point), `TransportCreate`
/// (opens the protocol-specific connection and wraps it in a
/// [`ModemTransport`]), `WaitTransportConnected`. The last stage collapses
/// to resolving immediately once the transport is constructed: unlike a
/// socket's asynchronous `connect()`, a modem connection index is only ever
/// handed back after `OpenNetwork` has already succeeded, so there is
/// nothing further to wait on.
pub struct ModemChannel<P, C> {
    access_point: Rc<ModemAccessPoint<P, C>>,
    address: Endpoint,
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> ModemChannel<P, C> {
    pub fn new(access_point: Rc<ModemAccessPoint<P, C>>, address: Endpoint) -> ModemChannel<P, C> {
        ModemChannel { access_point, address }
    }
}

impl<P: SerialPort + 'static, C: ModemCommandSet + 'static> Channel for ModemChannel<P, C> {
    fn transport_builder(&self, processor: &ActionProcessor) -> ActionPtr<TransportBuilderAction> {
        let (action, resolver) = TransportBuilderAction::new_handle();
        let ptr = processor.spawn(action);

        let keep_sub: Rc<RefCell<Option<Subscription<Status>>>> = Rc::new(RefCell::new(None));

        let address = self.address.clone();
        let processor = processor.clone();
        let connect_ptr = self.access_point.connect();
        let driver = self.access_point.driver().clone();
        let resolver2 = resolver.clone();
        let keep_sub2 = keep_sub.clone();

        let sub = connect_ptr.on_status(move |status| match status {
            Status::Result => {
                let (protocol, host, port) = endpoint_parts(&address);
                let open_ptr = driver.open_network(protocol, &host, port);
                let open_ptr2 = open_ptr.clone();
                let driver2 = driver.clone();
                let processor2 = processor.clone();
                let resolver3 = resolver2.clone();
                let keep_sub3 = keep_sub2.clone();

                let sub2 = open_ptr.on_status(move |status2| match status2 {
                    Status::Result => {
                        let index = open_ptr2
                            .borrow()
                            .value()
                            .copied()
                            .expect("Result status carries a resolved ConnectionIndex");
                        let transport = ModemTransport::new(&driver2, processor2.clone(), index);
                        let dyn_transport: Rc<dyn ByteIStream> = Rc::new(transport);
                        resolver3.resolve(dyn_transport);
                    }
                    Status::Error(e) => resolver3.fail(LinkError::ConnectFailed(e.to_string())),
                    Status::Stop => resolver3.fail(LinkError::Stopped),
                });
                *keep_sub3.borrow_mut() = Some(sub2);
            }
            Status::Error(e) => resolver2.fail(LinkError::ConnectFailed(e.to_string())),
            Status::Stop => resolver2.fail(LinkError::Stopped),
        });
        *keep_sub.borrow_mut() = Some(sub);

        ptr
    }

    fn properties(&self) -> ChannelProperties {
        let mtu = self.access_point.driver().commands().mtu();
        let (connection_type, reliability) = match self.address.protocol {
            Protocol::Tcp => (ConnectionType::Full, Reliability::Reliable),
            Protocol::Udp => (ConnectionType::Less, Reliability::Unreliable),
        };
        ChannelProperties {
            max_packet_size: mtu,
            rec_packet_size: mtu,
            connection_type,
            reliability,
        }
    }
}
