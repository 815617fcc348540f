use super::{Descriptor, Interest, RawEvent, Selector};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

pub(crate) struct Backend {
    ep: OwnedFd,
    waker: OwnedFd,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

const WAKE_KEY: u64 = u64::MAX;

impl Selector for Backend {
    fn new() -> io::Result<Backend> {
        let ep = unsafe { OwnedFd::from_raw_fd(cvt(libc::epoll_create1(libc::EPOLL_CLOEXEC))?) };
        let waker_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if waker_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let waker = unsafe { OwnedFd::from_raw_fd(waker_fd) };
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: WAKE_KEY,
        };
        cvt(unsafe {
            libc::epoll_ctl(ep.as_raw_fd(), libc::EPOLL_CTL_ADD, waker.as_raw_fd(), &mut event)
        })?;
        Ok(Backend { ep, waker })
    }

    fn select(&self, events: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as libc::c_int)
            .unwrap_or(-1);
        let mut raw = vec![libc::epoll_event { events: 0, u64: 0 }; 128];
        let n = cvt(unsafe {
            libc::epoll_wait(self.ep.as_raw_fd(), raw.as_mut_ptr(), raw.len() as i32, timeout_ms)
        })?;
        events.clear();
        for ev in &raw[..n as usize] {
            if ev.u64 == WAKE_KEY {
                drain_waker(self.waker.as_raw_fd());
                continue;
            }
            let bits = ev.events as libc::c_int;
            events.push(RawEvent {
                key: ev.u64,
                readable: bits & (libc::EPOLLIN | libc::EPOLLPRI) != 0,
                writable: bits & libc::EPOLLOUT != 0,
                error: bits & (libc::EPOLLERR | libc::EPOLLHUP | libc::EPOLLRDHUP) != 0,
            });
        }
        Ok(())
    }

    fn register(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: key,
        };
        cvt(unsafe { libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event) })
            .map(|_| ())
    }

    fn reregister(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll(interest),
            u64: key,
        };
        cvt(unsafe { libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut event) })
            .map(|_| ())
    }

    fn deregister(&self, fd: Descriptor) -> io::Result<()> {
        cvt(unsafe {
            libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        })
        .map(|_| ())
    }

    fn wake(&self) -> io::Result<()> {
        let buf: [u8; 8] = 1u64.to_ne_bytes();
        let ret = unsafe { libc::write(self.waker.as_raw_fd(), buf.as_ptr() as *const _, 8) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                drain_waker(self.waker.as_raw_fd());
                return self.wake();
            }
            return Err(err);
        }
        Ok(())
    }
}

fn drain_waker(fd: libc::c_int) {
    let mut buf = [0u8; 8];
    unsafe {
        libc::read(fd, buf.as_mut_ptr() as *mut _, 8);
    }
}

/// Always registers edge-triggered (`EPOLLET`): level-triggered behavior for
/// a descriptor that still has data is obtained by the caller draining on
/// every readable edge, not by re-arming here (`spec.md` §4.4).
fn interest_to_epoll(interest: Interest) -> u32 {
    let mut bits = libc::EPOLLET;
    if interest.is_readable() {
        bits |= libc::EPOLLIN | libc::EPOLLRDHUP;
    }
    if interest.is_writable() {
        bits |= libc::EPOLLOUT;
    }
    if interest.is_error() {
        bits |= libc::EPOLLERR | libc::EPOLLHUP;
    }
    bits as u32
}
