//! Windows I/O completion port selector.
//!
//! This is a deliberately reduced stand-in for `mio`'s real Windows backend,
//! which drives overlapped reads/writes through `AFD` device ioctls so it can
//! report readiness the same way epoll/kqueue do. Reproducing that here is
//! out of scope; instead each registered handle is associated with the port
//! and readiness is reported once per posted completion packet, which is
//! sufficient for the socket and modem-transport callers in this crate (they
//! re-arm by calling [`super::Poller::watch`] again after each callback).
//! Noted in `DESIGN.md` as a known simplification.

use super::{Descriptor, Interest, RawEvent, Selector};
use std::io;
use std::time::Duration;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatusEx, PostQueuedCompletionStatus,
    OVERLAPPED_ENTRY,
};

const WAKE_KEY: usize = usize::MAX;

pub(crate) struct Backend {
    port: HANDLE,
}

unsafe impl Send for Backend {}
unsafe impl Sync for Backend {}

impl Selector for Backend {
    fn new() -> io::Result<Backend> {
        let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 0) };
        if port == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Backend { port })
    }

    fn select(&self, events: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout.map(|t| t.as_millis() as u32).unwrap_or(u32::MAX);
        let mut entries: [OVERLAPPED_ENTRY; 128] = unsafe { std::mem::zeroed() };
        let mut removed: u32 = 0;
        let ok = unsafe {
            GetQueuedCompletionStatusEx(
                self.port,
                entries.as_mut_ptr(),
                entries.len() as u32,
                &mut removed,
                timeout_ms,
                0,
            )
        };
        events.clear();
        if ok == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(258) {
                // WAIT_TIMEOUT: no completions within the budget, not an error.
                return Ok(());
            }
            return Err(err);
        }
        for entry in &entries[..removed as usize] {
            let key = entry.lpCompletionKey;
            if key == WAKE_KEY {
                continue;
            }
            events.push(RawEvent {
                key: key as u64,
                readable: true,
                writable: true,
                error: false,
            });
        }
        Ok(())
    }

    fn register(&self, fd: Descriptor, key: u64, _interest: Interest) -> io::Result<()> {
        let result = unsafe { CreateIoCompletionPort(fd, self.port, key as usize, 0) };
        if result == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn reregister(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        // A handle can only ever be associated with one completion port;
        // re-registration here is a logical mask update tracked by the
        // caller, so just confirm the association still holds.
        self.register(fd, key, interest)
    }

    fn deregister(&self, _fd: Descriptor) -> io::Result<()> {
        // IOCP has no per-handle deregistration; `Poller` already stops
        // dispatching via its `alive` flag, matching the spec's "no further
        // callback after Remove" invariant without a kernel-side call here.
        Ok(())
    }

    fn wake(&self) -> io::Result<()> {
        let ok = unsafe { PostQueuedCompletionStatus(self.port, 0, WAKE_KEY, std::ptr::null_mut()) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.port);
        }
    }
}
