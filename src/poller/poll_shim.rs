//! `poll(2)`-based fallback selector.
//!
//! Stands in for the FreeRTOS+LwIP target (`spec.md` §4.4 names this as the
//! non-epoll/kqueue platform): no per-descriptor kernel-side registration, so
//! this backend keeps its own registration table and rebuilds the `pollfd`
//! array on every wait. `poll` is level-triggered by construction, which
//! already matches the "drain on every readable edge" semantics the other
//! backends have to emulate with `EV_CLEAR`/`EPOLLET`.

use super::{Descriptor, Interest, RawEvent, Selector};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Mutex;
use std::time::Duration;

struct Registration {
    key: u64,
    interest: Interest,
}

pub(crate) struct Backend {
    table: Mutex<HashMap<RawFd, Registration>>,
    wake_read: OwnedFd,
    wake_write: OwnedFd,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

impl Selector for Backend {
    fn new() -> io::Result<Backend> {
        let mut fds = [0 as libc::c_int; 2];
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for fd in fds {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        }
        Ok(Backend {
            table: Mutex::new(HashMap::new()),
            wake_read: unsafe { OwnedFd::from_raw_fd(fds[0]) },
            wake_write: unsafe { OwnedFd::from_raw_fd(fds[1]) },
        })
    }

    fn select(&self, events: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as libc::c_int)
            .unwrap_or(-1);
        let table = self.table.lock().unwrap();
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(table.len() + 1);
        pollfds.push(libc::pollfd {
            fd: self.wake_read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        let mut fd_order: Vec<RawFd> = Vec::with_capacity(table.len());
        for (&fd, reg) in table.iter() {
            let mut mask = 0;
            if reg.interest.is_readable() {
                mask |= libc::POLLIN;
            }
            if reg.interest.is_writable() {
                mask |= libc::POLLOUT;
            }
            pollfds.push(libc::pollfd {
                fd,
                events: mask,
                revents: 0,
            });
            fd_order.push(fd);
        }
        drop(table);

        cvt(unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) })?;

        events.clear();
        if pollfds[0].revents != 0 {
            let mut buf = [0u8; 64];
            unsafe { libc::read(self.wake_read.as_raw_fd(), buf.as_mut_ptr() as *mut _, 64) };
        }

        let table = self.table.lock().unwrap();
        for (i, fd) in fd_order.iter().enumerate() {
            let revents = pollfds[i + 1].revents;
            if revents == 0 {
                continue;
            }
            if let Some(reg) = table.get(fd) {
                events.push(RawEvent {
                    key: reg.key,
                    readable: revents & libc::POLLIN != 0,
                    writable: revents & libc::POLLOUT != 0,
                    error: revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
                });
            }
        }
        Ok(())
    }

    fn register(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        self.table.lock().unwrap().insert(fd, Registration { key, interest });
        Ok(())
    }

    fn reregister(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        self.register(fd, key, interest)
    }

    fn deregister(&self, fd: Descriptor) -> io::Result<()> {
        self.table.lock().unwrap().remove(&fd);
        Ok(())
    }

    fn wake(&self) -> io::Result<()> {
        let buf = [1u8];
        unsafe { libc::write(self.wake_write.as_raw_fd(), buf.as_ptr() as *const _, 1) };
        Ok(())
    }
}
