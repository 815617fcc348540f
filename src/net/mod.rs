//! Non-blocking socket abstraction (`spec.md` §4.5).
//!
//! [`Socket`] is driven as an [`crate::action::Action`]: the poller's worker
//! thread only ever touches the small [`Readiness`] atomics and calls
//! [`crate::action::ActionTrigger::trigger`], per the concurrency model in
//! `spec.md` §5 ("all such callbacks... must do minimal work, set atomics...
//! and call Trigger()"). The actual `recv`/`send`/connect-completion work
//! happens inside `Socket::update`, on the single cooperative thread.

mod tcp;
mod udp;

pub use tcp::TcpSocket;
pub use udp::UdpSocket;

use crate::action::{Action, ActionTrigger, Stoppable, UpdateStatus};
use crate::buf::DataBuffer;
use crate::callback::Callback;
use crate::error::LinkError;
use crate::event::Event;
use crate::poller::{Descriptor, Interest, Poller};
use crate::time::Instant;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connection lifecycle state (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    None,
    Connecting,
    Connected,
    ConnectionFailed,
    Disconnected,
}

#[derive(Default)]
struct Readiness {
    readable: AtomicBool,
    writable: AtomicBool,
    error: AtomicBool,
}

pub struct SocketConfig {
    pub recv_buffer_size: usize,
    pub max_packet_size: usize,
}

impl Default for SocketConfig {
    fn default() -> SocketConfig {
        SocketConfig {
            recv_buffer_size: 4096,
            max_packet_size: 1500,
        }
    }
}

fn cvt(ret: libc::c_int) -> std::io::Result<libc::c_int> {
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// Disables `SIGPIPE` delivery for writes on this descriptor where the
/// platform supports `SO_NOSIGPIPE`; elsewhere every `send` call passes
/// `MSG_NOSIGNAL` instead (`spec.md` §4.5).
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn set_nosigpipe(fd: RawFd) {
    let one: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
fn set_nosigpipe(_fd: RawFd) {}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const SEND_FLAGS: libc::c_int = 0;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;

fn sockaddr_of(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// Non-blocking TCP/UDP socket driven by the cooperative scheduler.
///
/// Construct via [`TcpSocket::connect`] / [`UdpSocket::connect`], which wrap
/// this type with the right `socket()`/`connect()` call.
pub struct Socket {
    fd: RawFd,
    poller: Rc<Poller>,
    #[allow(dead_code)]
    trigger: ActionTrigger,
    readiness: Arc<Readiness>,
    state: ConnState,
    config: SocketConfig,
    recv_buf: Vec<u8>,
    connect_announced: bool,
    connected_cb: Option<Callback<ConnState>>,
    on_ready_to_write: Event<()>,
    on_recv: Event<DataBuffer>,
    on_error: Event<LinkError>,
}

impl Socket {
    fn new(
        fd: RawFd,
        poller: Rc<Poller>,
        trigger: ActionTrigger,
        config: SocketConfig,
        connected_cb: Callback<ConnState>,
    ) -> std::io::Result<Socket> {
        set_nonblocking(fd)?;
        set_nosigpipe(fd);
        let readiness = Arc::new(Readiness::default());
        let cb_readiness = readiness.clone();
        let cb_trigger = trigger.clone();
        poller.watch(
            fd as Descriptor,
            Interest::READABLE.add(Interest::WRITABLE).add(Interest::ERROR),
            move |(_fd, mask)| {
                if mask.is_readable() {
                    cb_readiness.readable.store(true, Ordering::Release);
                }
                if mask.is_writable() {
                    cb_readiness.writable.store(true, Ordering::Release);
                }
                if mask.is_error() {
                    cb_readiness.error.store(true, Ordering::Release);
                }
                cb_trigger.trigger();
            },
        )?;
        Ok(Socket {
            fd,
            poller,
            trigger,
            readiness,
            state: ConnState::Connecting,
            recv_buf: vec![0u8; config.recv_buffer_size],
            config,
            connect_announced: false,
            connected_cb: Some(connected_cb),
            on_ready_to_write: Event::new(),
            on_recv: Event::new(),
            on_error: Event::new(),
        })
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn max_packet_size(&self) -> usize {
        self.config.max_packet_size
    }

    pub fn on_ready_to_write<F>(&self, f: F) -> crate::event::Subscription<()>
    where
        F: FnMut(&()) + 'static,
    {
        self.on_ready_to_write.subscribe(f)
    }

    pub fn on_recv_data<F>(&self, f: F) -> crate::event::Subscription<DataBuffer>
    where
        F: FnMut(&DataBuffer) + 'static,
    {
        self.on_recv.subscribe(f)
    }

    pub fn on_error<F>(&self, f: F) -> crate::event::Subscription<LinkError>
    where
        F: FnMut(&LinkError) + 'static,
    {
        self.on_error.subscribe(f)
    }

    /// Non-blocking send; see `spec.md` §4.5 for the three-way return.
    pub fn send(&mut self, bytes: &[u8]) -> Option<usize> {
        if self.state != ConnState::Connected {
            return None;
        }
        let n = unsafe { libc::send(self.fd, bytes.as_ptr() as *const _, bytes.len(), SEND_FLAGS) };
        if n >= 0 {
            Some(n as usize)
        } else {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK => Some(0),
                _ => {
                    self.fail(LinkError::SendFailed(err.to_string()));
                    None
                }
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.state == ConnState::Connected || self.state == ConnState::Connecting {
            let _ = self.poller.remove(self.fd as Descriptor);
            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
            }
            self.state = ConnState::Disconnected;
        }
    }

    fn fail(&mut self, err: LinkError) {
        if self.state == ConnState::Disconnected {
            return;
        }
        #[cfg(feature = "log")]
        log::warn!("socket fd {} failed: {err}", self.fd);
        let _ = self.poller.remove(self.fd as Descriptor);
        self.state = ConnState::ConnectionFailed;
        self.on_error.emit(&err);
    }

    fn socket_error(&self) -> std::io::Result<()> {
        let mut err: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut err as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        cvt(ret)?;
        if err != 0 {
            Err(std::io::Error::from_raw_os_error(err))
        } else {
            Ok(())
        }
    }

    fn drain_recv(&mut self) {
        loop {
            let n = unsafe {
                libc::recv(
                    self.fd,
                    self.recv_buf.as_mut_ptr() as *mut _,
                    self.recv_buf.len(),
                    0,
                )
            };
            if n > 0 {
                self.on_recv.emit(&DataBuffer::from(&self.recv_buf[..n as usize]));
                if (n as usize) < self.recv_buf.len() {
                    break;
                }
                continue;
            } else if n == 0 {
                self.fail(LinkError::RecvFailed("connection closed".into()));
                break;
            } else {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EAGAIN) {
                    break;
                }
                self.fail(LinkError::RecvFailed(err.to_string()));
                break;
            }
        }
    }
}

impl Action for Socket {
    fn update(&mut self, _now: Instant) -> UpdateStatus {
        if self.state == ConnState::Connecting
            && (self.readiness.writable.swap(false, Ordering::AcqRel)
                || self.readiness.error.swap(false, Ordering::AcqRel))
        {
            match self.socket_error() {
                Ok(()) => self.state = ConnState::Connected,
                Err(_) => self.state = ConnState::ConnectionFailed,
            }
        }

        if !self.connect_announced
            && (self.state == ConnState::Connected || self.state == ConnState::ConnectionFailed)
        {
            self.connect_announced = true;
            #[cfg(feature = "log")]
            log::debug!("socket fd {} connect completed: {:?}", self.fd, self.state);
            if let Some(mut cb) = self.connected_cb.take() {
                cb.call(self.state);
            }
            if self.state == ConnState::ConnectionFailed {
                let _ = self.poller.remove(self.fd as Descriptor);
            }
        }

        if self.state != ConnState::Connected {
            return UpdateStatus::Nothing;
        }

        if self.readiness.readable.swap(false, Ordering::AcqRel) {
            self.drain_recv();
        }
        if self.state == ConnState::Connected && self.readiness.error.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.socket_error() {
                self.fail(LinkError::Io(e));
            }
        }
        if self.state == ConnState::Connected && self.readiness.writable.swap(false, Ordering::AcqRel) {
            self.on_ready_to_write.emit(&());
        }

        UpdateStatus::Nothing
    }
}

impl Stoppable for Socket {
    fn stop(&mut self) {
        self.disconnect();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.state != ConnState::Disconnected {
            let _ = self.poller.remove(self.fd as Descriptor);
        }
        unsafe {
            libc::close(self.fd);
        }
    }
}
