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

/// TCP stream socket (`spec.md` §4.5): max packet size ~1500.
pub struct TcpSocket {
    inner: Socket,
}

impl TcpSocket {
    /// Issues a non-blocking `socket()`+`connect()` and registers with
    /// `poller`. `connected_cb` fires exactly once with the terminal
    /// connection state.
    pub fn connect(
        addr: SocketAddr,
        poller: Rc<Poller>,
        trigger: ActionTrigger,
        connected_cb: Callback<ConnState>,
    ) -> std::io::Result<TcpSocket> {
        let domain = match addr {
            SocketAddr::V4(_) => libc::AF_INET,
            SocketAddr::V6(_) => libc::AF_INET6,
        };
        let fd = cvt(unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) })?;
        let (storage, len) = sockaddr_of(addr);
        let ret = unsafe {
            libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len)
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                unsafe { libc::close(fd) };
                return Err(err);
            }
        }
        let config = SocketConfig {
            max_packet_size: 1500,
            ..SocketConfig::default()
        };
        let inner = Socket::new(fd, poller, trigger, config, connected_cb)?;
        Ok(TcpSocket { inner })
    }

    pub fn state(&self) -> ConnState {
        self.inner.state()
    }

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

impl Action for TcpSocket {
    fn update(&mut self, now: Instant) -> UpdateStatus {
        self.inner.update(now)
    }
}

impl Stoppable for TcpSocket {
    fn stop(&mut self) {
        self.inner.stop()
    }
}

impl crate::stream::SocketPacketSendAction for TcpSocket {
    fn send(&mut self, bytes: &[u8]) -> Option<usize> {
        TcpSocket::send(self, bytes)
    }
}
