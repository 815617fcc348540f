//! Socket-backed channel builders: concrete [`ByteIStream`]s over a
//! non-blocking TCP or UDP socket (`spec.md` §4.5, §4.10).

use super::channel::{Channel, ChannelProperties, ConnectionType, Reliability, TransportBuilderAction};
use crate::action::{Action, ActionPtr, ActionProcessor, ActionTrigger, Stoppable, UpdateStatus};
use crate::buf::DataBuffer;
use crate::callback::Callback;
use crate::error::LinkError;
use crate::event::{Event, Subscription};
use crate::net::{ConnState, TcpSocket, UdpSocket};
use crate::poller::Poller;
use crate::stream::{ByteIStream, ReadAction, SendQueueManager, SocketPacketSendAction, StreamInfo, StreamWriteAction};
use crate::time::Instant;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

/// The handful of `TcpSocket`/`UdpSocket` members [`SocketTransport`] needs
/// beyond [`SocketPacketSendAction`], so it can be generic over either.
trait SocketHandle: SocketPacketSendAction + Action + Stoppable + 'static {
    fn conn_state(&self) -> ConnState;
    fn disconnect_socket(&mut self);
    fn subscribe_recv<F>(&self, f: F) -> Subscription<DataBuffer>
    where
        F: FnMut(&DataBuffer) + 'static;
    fn subscribe_error<F>(&self, f: F) -> Subscription<LinkError>
    where
        F: FnMut(&LinkError) + 'static;
    fn subscribe_ready<F>(&self, f: F) -> Subscription<()>
    where
        F: FnMut(&()) + 'static;
}

impl SocketHandle for TcpSocket {
    fn conn_state(&self) -> ConnState {
        self.state()
    }

    fn disconnect_socket(&mut self) {
        self.disconnect()
    }

    fn subscribe_recv<F>(&self, f: F) -> Subscription<DataBuffer>
    where
        F: FnMut(&DataBuffer) + 'static,
    {
        self.on_recv_data(f)
    }

    fn subscribe_error<F>(&self, f: F) -> Subscription<LinkError>
    where
        F: FnMut(&LinkError) + 'static,
    {
        self.on_error(f)
    }

    fn subscribe_ready<F>(&self, f: F) -> Subscription<()>
    where
        F: FnMut(&()) + 'static,
    {
        self.on_ready_to_write(f)
    }
}

impl SocketHandle for UdpSocket {
    fn conn_state(&self) -> ConnState {
        self.state()
    }

    fn disconnect_socket(&mut self) {
        self.disconnect()
    }

    fn subscribe_recv<F>(&self, f: F) -> Subscription<DataBuffer>
    where
        F: FnMut(&DataBuffer) + 'static,
    {
        self.on_recv_data(f)
    }

    fn subscribe_error<F>(&self, f: F) -> Subscription<LinkError>
    where
        F: FnMut(&LinkError) + 'static,
    {
        self.on_error(f)
    }

    fn subscribe_ready<F>(&self, f: F) -> Subscription<()>
    where
        F: FnMut(&()) + 'static,
    {
        self.on_ready_to_write(f)
    }
}

/// Ticks a socket held in an `Rc<RefCell<_>>` shared with
/// [`SendQueueManager`], so both can act on the same descriptor without
/// the scheduler owning it outright.
struct SharedSocket<S> {
    inner: Rc<RefCell<S>>,
}

impl<S: Action> Action for SharedSocket<S> {
    fn update(&mut self, now: Instant) -> UpdateStatus {
        self.inner.borrow_mut().update(now)
    }
}

impl<S: Stoppable> Stoppable for SharedSocket<S> {
    fn stop(&mut self) {
        self.inner.borrow_mut().stop()
    }
}

/// A live socket-backed stream: a send queue plus buffered reads, matching
/// the `ByteIStream` contract above a raw [`crate::net::Socket`]
/// (`spec.md` §4.6).
pub struct SocketTransport<S: SocketHandle> {
    socket: Rc<RefCell<S>>,
    processor: ActionProcessor,
    send_queue: ActionPtr<SendQueueManager<S>>,
    read_action: ActionPtr<ReadAction>,
    stream_update: Event<StreamInfo>,
    _recv_sub: Subscription<DataBuffer>,
    _error_sub: Subscription<LinkError>,
    _ready_sub: Subscription<()>,
}

impl<S: SocketHandle> SocketTransport<S> {
    /// `socket` must already be registered with the processor (via
    /// [`SharedSocket`]) by the caller; this only wires up the send queue
    /// and buffered reads above it.
    fn new(processor: &ActionProcessor, socket: Rc<RefCell<S>>) -> Rc<SocketTransport<S>> {
        let read_action = processor.spawn(ReadAction::new());
        let send_queue = processor.spawn(SendQueueManager::new(socket.clone()));
        let stream_update: Event<StreamInfo> = Event::new();

        let read_action2 = read_action.clone();
        let recv_sub = socket.borrow().subscribe_recv(move |data: &DataBuffer| {
            read_action2.borrow_mut().push(data.clone());
        });

        let stream_update2 = stream_update.clone();
        let error_sub = socket.borrow().subscribe_error(move |err: &LinkError| {
            stream_update2.emit(&StreamInfo::failed(LinkError::RecvFailed(err.to_string())));
        });

        let send_queue2 = send_queue.clone();
        let ready_sub = socket.borrow().subscribe_ready(move |_| {
            send_queue2.borrow().try_progress();
        });

        stream_update.emit(&StreamInfo::connected());

        Rc::new(SocketTransport {
            socket,
            processor: processor.clone(),
            send_queue,
            read_action,
            stream_update,
            _recv_sub: recv_sub,
            _error_sub: error_sub,
            _ready_sub: ready_sub,
        })
    }
}

impl<S: SocketHandle> ByteIStream for SocketTransport<S> {
    fn write(&self, data: DataBuffer) -> ActionPtr<StreamWriteAction> {
        self.send_queue.borrow().push(&self.processor, data)
    }

    fn stream_update_event(&self) -> Event<StreamInfo> {
        self.stream_update.clone()
    }

    fn out_data_event(&self) -> Event<DataBuffer> {
        self.read_action.borrow().out_data_event()
    }

    fn restream(&self) {
        self.socket.borrow_mut().disconnect_socket();
        self.stream_update.emit(&StreamInfo::failed(LinkError::Stopped));
    }
}

impl<S: SocketHandle> Drop for SocketTransport<S> {
    fn drop(&mut self) {
        self.read_action.borrow_mut().stop();
        self.send_queue.borrow_mut().stop();
        if self.socket.borrow().conn_state() != ConnState::Disconnected {
            self.socket.borrow_mut().disconnect_socket();
        }
    }
}

/// Connects `S` to `addr` and, once the socket reports `Connected`, wraps it
/// in a [`SocketTransport`] and resolves the builder action. A
/// `ConnectionFailed` callback fails it instead; this is `WaitTransportConnected`
/// from `spec.md` §4.10 applied to a socket's async `connect()`.
fn connect_builder<S, F>(
    processor: &ActionProcessor,
    poller: Rc<Poller>,
    addr: SocketAddr,
    connect_fn: F,
) -> ActionPtr<TransportBuilderAction>
where
    S: SocketHandle,
    F: FnOnce(SocketAddr, Rc<Poller>, ActionTrigger, Callback<ConnState>) -> std::io::Result<S>,
{
    let (action, resolver) = TransportBuilderAction::new_handle();
    let ptr = processor.spawn(action);

    let trigger = processor.trigger();
    let processor2 = processor.clone();
    let resolver2 = resolver.clone();
    let socket_slot: Rc<RefCell<Option<Rc<RefCell<S>>>>> = Rc::new(RefCell::new(None));
    let socket_slot2 = socket_slot.clone();

    let connected_cb = Callback::new(move |state: ConnState| match state {
        ConnState::Connected => {
            if let Some(socket) = socket_slot2.borrow().clone() {
                let transport = SocketTransport::new(&processor2, socket);
                let dyn_transport: Rc<dyn ByteIStream> = transport;
                resolver2.resolve(dyn_transport);
            }
        }
        ConnState::ConnectionFailed => {
            resolver2.fail(LinkError::ConnectFailed(format!("connect to {addr} failed")));
        }
        _ => {}
    });

    match connect_fn(addr, poller, trigger, connected_cb) {
        Ok(socket) => {
            let socket = Rc::new(RefCell::new(socket));
            // Ticked from here, not from `SocketTransport::new`: the socket
            // must already be making progress through `Connecting` before
            // `connected_cb` ever fires to construct the transport.
            processor.spawn(SharedSocket { inner: socket.clone() });
            *socket_slot.borrow_mut() = Some(socket);
        }
        Err(e) => resolver.fail(LinkError::Io(e)),
    }

    ptr
}

/// A channel that reaches `addr` over a non-blocking TCP connection.
pub struct TcpChannel {
    poller: Rc<Poller>,
    addr: SocketAddr,
}

impl TcpChannel {
    pub fn new(poller: Rc<Poller>, addr: SocketAddr) -> TcpChannel {
        TcpChannel { poller, addr }
    }
}

impl Channel for TcpChannel {
    fn transport_builder(&self, processor: &ActionProcessor) -> ActionPtr<TransportBuilderAction> {
        connect_builder(processor, self.poller.clone(), self.addr, TcpSocket::connect)
    }

    fn properties(&self) -> ChannelProperties {
        ChannelProperties {
            max_packet_size: 1500,
            rec_packet_size: 1500,
            connection_type: ConnectionType::Full,
            reliability: Reliability::Reliable,
        }
    }
}

/// A channel that reaches `addr` over a "connected" UDP socket.
pub struct UdpChannel {
    poller: Rc<Poller>,
    addr: SocketAddr,
}

impl UdpChannel {
    pub fn new(poller: Rc<Poller>, addr: SocketAddr) -> UdpChannel {
        UdpChannel { poller, addr }
    }
}

impl Channel for UdpChannel {
    fn transport_builder(&self, processor: &ActionProcessor) -> ActionPtr<TransportBuilderAction> {
        connect_builder(processor, self.poller.clone(), self.addr, UdpSocket::connect)
    }

    fn properties(&self) -> ChannelProperties {
        ChannelProperties {
            max_packet_size: 1200,
            rec_packet_size: 1200,
            connection_type: ConnectionType::Less,
            reliability: Reliability::Unreliable,
        }
    }
}
