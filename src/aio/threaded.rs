//! Thread-pool backed asynchronous I/O primitive.
//!
//! Requests are queued to a fixed set of worker threads that perform
//! `pread`/`pwrite` and invoke the completion handler on the worker thread,
//! which is the same shape as POSIX AIO with thread notification.

use super::{AioSubmitter, ReadCompletion, ReadHandler, WriteCompletion, WriteHandler};

use std::io;
use std::os::fd::RawFd;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

enum Request {
    Read {
        fd: RawFd,
        offset: libc::off_t,
        len: usize,
        handler: ReadHandler,
    },
    Write {
        fd: RawFd,
        data: Vec<u8>,
        offset: libc::off_t,
        handler: WriteHandler,
    },
}

/// Default native primitive: worker threads doing positional I/O.
pub struct ThreadedAio {
    sender: Mutex<Option<Sender<Request>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadedAio {
    /// Starts `workers` threads (at least one).
    pub fn new(workers: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Request>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("aio-worker-{index}"))
                .spawn(move || worker_loop(receiver))?;
            handles.push(handle);
        }

        debug!(workers = handles.len(), "threaded aio started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    fn enqueue(&self, request: Request) -> io::Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender
                .send(request)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "aio workers exited")),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "aio primitive shut down",
            )),
        }
    }
}

/// Rejects the request up front the way `aio_read(3)` does for a bad
/// descriptor or offset.
fn validate(fd: RawFd, offset: u64) -> io::Result<libc::off_t> {
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(io::Error::last_os_error());
    }
    libc::off_t::try_from(offset).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

impl AioSubmitter for ThreadedAio {
    fn submit_read(
        &self,
        fd: RawFd,
        offset: u64,
        len: usize,
        handler: ReadHandler,
    ) -> io::Result<()> {
        let offset = validate(fd, offset)?;
        self.enqueue(Request::Read {
            fd,
            offset,
            len,
            handler,
        })
    }

    fn submit_write(
        &self,
        fd: RawFd,
        data: Vec<u8>,
        offset: u64,
        handler: WriteHandler,
    ) -> io::Result<()> {
        let offset = validate(fd, offset)?;
        self.enqueue(Request::Write {
            fd,
            data,
            offset,
            handler,
        })
    }
}

impl Drop for ThreadedAio {
    fn drop(&mut self) {
        // Closing the channel lets every worker finish its queue and exit.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Request>>>) {
    loop {
        let request = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };

        match request {
            Ok(Request::Read {
                fd,
                offset,
                len,
                handler,
            }) => handler(pread(fd, offset, len)),
            Ok(Request::Write {
                fd,
                data,
                offset,
                handler,
            }) => handler(pwrite(fd, &data, offset)),
            Err(_) => break,
        }
    }
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn pread(fd: RawFd, offset: libc::off_t, len: usize) -> ReadCompletion {
    let mut buf = vec![0u8; len];
    loop {
        let res = unsafe { libc::pread(fd, buf.as_mut_ptr() as *mut _, len, offset) };
        if res < 0 {
            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            trace!(fd, offset, err, "pread failed");
            return ReadCompletion::failed(err);
        }

        buf.truncate(res as usize);
        trace!(fd, offset, read = res, "pread done");
        return ReadCompletion::ok(buf);
    }
}

fn pwrite(fd: RawFd, data: &[u8], offset: libc::off_t) -> WriteCompletion {
    loop {
        let res = unsafe { libc::pwrite(fd, data.as_ptr() as *const _, data.len(), offset) };
        if res < 0 {
            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            trace!(fd, offset, err, "pwrite failed");
            return WriteCompletion::failed(err);
        }

        trace!(fd, offset, written = res, "pwrite done");
        return WriteCompletion::ok(res as usize);
    }
}
