//! Blocking wait on the reactor's wake pipe.
//!
//! The reactor has no descriptors to multiplex; it only needs to sleep until
//! the next timer deadline unless something pokes it earlier. A non-blocking
//! self-pipe polled with `poll(2)` gives both: the timeout covers timers and
//! the read end becomes readable when a [`Notifier`] writes to it.

use libc::{O_CLOEXEC, O_NONBLOCK, POLLIN, c_int, pollfd};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Poller {
    read: OwnedFd,
    write: Arc<OwnedFd>,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds = [0 as c_int; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), O_NONBLOCK | O_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: pipe2 succeeded, both descriptors are fresh and owned here.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        Ok(Self {
            read,
            write: Arc::new(write),
        })
    }

    pub(crate) fn notifier(&self) -> Notifier {
        Notifier {
            fd: self.write.clone(),
        }
    }

    /// Waits until the pipe is readable or `timeout` elapses (`None` waits
    /// forever). Returns whether a notification was consumed.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut pfd = pollfd {
            fd: self.read.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        };

        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms(timeout)) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        if rc == 0 || pfd.revents & POLLIN == 0 {
            return Ok(false);
        }

        self.drain();
        Ok(true)
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut _,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}

/// Rounds up so a timer is never woken for a few microseconds early.
fn timeout_ms(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            ms.min(c_int::MAX as u128) as c_int
        }
    }
}

/// Thread-safe handle that wakes a blocked reactor.
///
/// Safe to call from any thread, including native completion threads.
#[derive(Clone)]
pub struct Notifier {
    fd: Arc<OwnedFd>,
}

impl Notifier {
    pub fn notify(&self) {
        let byte = 1u8;
        // EAGAIN means the pipe is full, so a wake-up is already pending.
        let _ = unsafe { libc::write(self.fd.as_raw_fd(), &byte as *const u8 as *const _, 1) };
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}
