use super::{Descriptor, Interest, RawEvent, Selector};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

pub(crate) struct Backend {
    kq: OwnedFd,
}

const WAKE_IDENT: libc::uintptr_t = 0;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn kevent_change(
    kq: libc::c_int,
    ident: libc::uintptr_t,
    filter: i16,
    flags: u16,
    udata: isize,
) -> io::Result<()> {
    let changes = [libc::kevent {
        ident,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: udata as *mut libc::c_void,
    }];
    cvt(unsafe {
        libc::kevent(kq, changes.as_ptr(), 1, std::ptr::null_mut(), 0, std::ptr::null())
    })
    .map(|_| ())
}

impl Selector for Backend {
    fn new() -> io::Result<Backend> {
        let kq = unsafe { OwnedFd::from_raw_fd(cvt(libc::kqueue())?) };
        kevent_change(
            kq.as_raw_fd(),
            WAKE_IDENT,
            libc::EVFILT_USER,
            libc::EV_ADD | libc::EV_CLEAR,
            0,
        )?;
        Ok(Backend { kq })
    }

    fn select(&self, events: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let ts = timeout.map(|t| libc::timespec {
            tv_sec: t.as_secs() as libc::time_t,
            tv_nsec: t.subsec_nanos() as libc::c_long,
        });
        let ts_ptr = ts
            .as_ref()
            .map(|t| t as *const libc::timespec)
            .unwrap_or(std::ptr::null());
        let mut raw: Vec<libc::kevent> = (0..128)
            .map(|_| libc::kevent {
                ident: 0,
                filter: 0,
                flags: 0,
                fflags: 0,
                data: 0,
                udata: std::ptr::null_mut(),
            })
            .collect();
        let n = cvt(unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                std::ptr::null(),
                0,
                raw.as_mut_ptr(),
                raw.len() as i32,
                ts_ptr,
            )
        })?;
        events.clear();
        for ev in &raw[..n as usize] {
            if ev.filter == libc::EVFILT_USER {
                continue;
            }
            let key = ev.udata as u64;
            let readable = ev.filter == libc::EVFILT_READ;
            let writable = ev.filter == libc::EVFILT_WRITE;
            let error = ev.flags & libc::EV_ERROR != 0 || ev.flags & libc::EV_EOF != 0;
            events.push(RawEvent {
                key,
                readable,
                writable,
                error,
            });
        }
        Ok(())
    }

    fn register(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        self.reregister(fd, key, interest)
    }

    fn reregister(&self, fd: Descriptor, key: u64, interest: Interest) -> io::Result<()> {
        let udata = key as isize;
        if interest.is_readable() {
            kevent_change(
                self.kq.as_raw_fd(),
                fd as libc::uintptr_t,
                libc::EVFILT_READ,
                libc::EV_ADD | libc::EV_CLEAR,
                udata,
            )?;
        } else {
            let _ = kevent_change(
                self.kq.as_raw_fd(),
                fd as libc::uintptr_t,
                libc::EVFILT_READ,
                libc::EV_DELETE,
                udata,
            );
        }
        if interest.is_writable() {
            kevent_change(
                self.kq.as_raw_fd(),
                fd as libc::uintptr_t,
                libc::EVFILT_WRITE,
                libc::EV_ADD | libc::EV_CLEAR,
                udata,
            )?;
        } else {
            let _ = kevent_change(
                self.kq.as_raw_fd(),
                fd as libc::uintptr_t,
                libc::EVFILT_WRITE,
                libc::EV_DELETE,
                udata,
            );
        }
        Ok(())
    }

    fn deregister(&self, fd: Descriptor) -> io::Result<()> {
        let _ = kevent_change(
            self.kq.as_raw_fd(),
            fd as libc::uintptr_t,
            libc::EVFILT_READ,
            libc::EV_DELETE,
            0,
        );
        let _ = kevent_change(
            self.kq.as_raw_fd(),
            fd as libc::uintptr_t,
            libc::EVFILT_WRITE,
            libc::EV_DELETE,
            0,
        );
        Ok(())
    }

    fn wake(&self) -> io::Result<()> {
        let changes = [libc::kevent {
            ident: WAKE_IDENT,
            filter: libc::EVFILT_USER,
            flags: 0,
            fflags: libc::NOTE_TRIGGER,
            data: 0,
            udata: std::ptr::null_mut(),
        }];
        cvt(unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                changes.as_ptr(),
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        })
        .map(|_| ())
    }
}
