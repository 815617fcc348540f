use super::{cvt, sockaddr_of, ConnState, Socket, SocketConfig};
use crate::action::{Action, ActionTrigger, Stoppable, UpdateStatus};
use crate::buf::DataBuffer;
use crate::callback::Callback;
use crate::error::LinkError;
use crate::event::Subscription;
use crate::poller::Poller;
use crate::time::Instant;
use std::net::SocketAddr;
use std::rc::Rc;

/// UDP "connected" socket: `connect(2)` binds the remote address to the
/// descriptor so subsequent `send` needs no address argument, per
/// `spec.md` §4.5. Max packet size ~1200, below the common 1500 MTU to
/// leave headroom for IP/UDP headers and safe-stream framing.
pub struct UdpSocket {
    inner: Socket,
}

impl UdpSocket {
    pub fn connect(
        addr: SocketAddr,
        poller: Rc<Poller>,
        trigger: ActionTrigger,
        connected_cb: Callback<ConnState>,
    ) -> std::io::Result<UdpSocket> {
        let domain = match addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };
        let fd = cvt(unsafe { libc::socket(domain, libc::SOCK_DGRAM, 0) })?;
        let (storage, len) = sockaddr_of(addr);
        if let Err(err) =
            cvt(unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) })
        {
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let config = SocketConfig {
            max_packet_size: 1200,
            ..SocketConfig::default()
        };
        let inner = Socket::new(fd, poller, trigger, config, connected_cb)?;
        Ok(UdpSocket { inner })
    }

    pub fn state(&self) -> ConnState {
        self.inner.state()
    }

    /// Datagram sends are all-or-nothing: a partial-accept return from the
    /// kernel never happens for `SOCK_DGRAM`, so `Some(0)` here always means
    /// "retry on `ReadyToWrite`", not a truncated datagram.
    pub fn send(&mut self, bytes: &[u8]) -> Option<usize> {
        self.inner.send(bytes)
    }

    pub fn disconnect(&mut self) {
        self.inner.disconnect()
    }

    pub fn on_ready_to_write<F>(&self, f: F) -> Subscription<()>
    where
        F: FnMut(&()) + 'static,
    {
        self.inner.on_ready_to_write(f)
    }

    pub fn on_recv_data<F>(&self, f: F) -> Subscription<DataBuffer>
    where
        F: FnMut(&DataBuffer) + 'static,
    {
        self.inner.on_recv_data(f)
    }

    pub fn on_error<F>(&self, f: F) -> Subscription<LinkError>
    where
        F: FnMut(&LinkError) + 'static,
    {
        self.inner.on_error(f)
    }
}

impl Action for UdpSocket {
    fn update(&mut self, now: Instant) -> UpdateStatus {
        self.inner.update(now)
    }
}

impl Stoppable for UdpSocket {
    fn stop(&mut self) {
        self.inner.stop()
    }
}

impl crate::stream::SocketPacketSendAction for UdpSocket {
    fn send(&mut self, bytes: &[u8]) -> Option<usize> {
        UdpSocket::send(self, bytes)
    }
}
