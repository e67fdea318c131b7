#![allow(dead_code)]

use aiofile::{AioSubmitter, ReadCompletion, Runtime, RuntimeBuilder, WriteCompletion};
use aiofile::aio::{ReadHandler, WriteHandler};

use std::fs::File;
use std::io;
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One request as seen by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Read { offset: u64, len: usize },
    Write { offset: u64, data: Vec<u8> },
}

/// Native primitive that performs real positional I/O on a helper thread,
/// with knobs for short writes, failures and refusals, and a log of every
/// accepted submission.
#[derive(Default)]
pub struct ScriptedAio {
    max_write: AtomicUsize,
    fail_errno: AtomicI32,
    reject: AtomicBool,
    log: Mutex<Vec<Submitted>>,
}

impl ScriptedAio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Confirm at most `n` bytes per write.
    pub fn max_write(&self, n: usize) {
        self.max_write.store(n, Ordering::SeqCst);
    }

    /// Complete every following operation with a negative result.
    pub fn fail_with(&self, errno: i32) {
        self.fail_errno.store(errno, Ordering::SeqCst);
    }

    /// Refuse every following submission up front.
    pub fn reject(&self, on: bool) {
        self.reject.store(on, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<Submitted> {
        self.log.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Submitted::Write { offset, data } => Some((offset, data)),
                Submitted::Read { .. } => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes().len()
    }

    pub fn read_count(&self) -> usize {
        self.log().len() - self.write_count()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn refuse(&self) -> io::Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::EAGAIN));
        }
        Ok(())
    }
}

fn borrowed_file(fd: RawFd) -> ManuallyDrop<File> {
    // SAFETY: the descriptor is owned by the AioFile, which awaits every
    // submission before closing it; ManuallyDrop keeps us from closing it.
    ManuallyDrop::new(unsafe { File::from_raw_fd(fd) })
}

impl AioSubmitter for ScriptedAio {
    fn submit_read(
        &self,
        fd: RawFd,
        offset: u64,
        len: usize,
        handler: ReadHandler,
    ) -> io::Result<()> {
        self.refuse()?;
        self.log
            .lock()
            .unwrap()
            .push(Submitted::Read { offset, len });

        let errno = self.fail_errno.load(Ordering::SeqCst);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1));
            if errno != 0 {
                return handler(ReadCompletion::failed(errno));
            }
            let file = borrowed_file(fd);
            let mut buf = vec![0u8; len];
            match file.read_at(&mut buf, offset) {
                Ok(n) => {
                    buf.truncate(n);
                    handler(ReadCompletion::ok(buf))
                }
                Err(e) => handler(ReadCompletion::failed(e.raw_os_error().unwrap_or(libc::EIO))),
            }
        });
        Ok(())
    }

    fn submit_write(
        &self,
        fd: RawFd,
        data: Vec<u8>,
        offset: u64,
        handler: WriteHandler,
    ) -> io::Result<()> {
        self.refuse()?;
        self.log.lock().unwrap().push(Submitted::Write {
            offset,
            data: data.clone(),
        });

        let errno = self.fail_errno.load(Ordering::SeqCst);
        let cap = match self.max_write.load(Ordering::SeqCst) {
            0 => data.len(),
            n => n.min(data.len()),
        };
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1));
            if errno != 0 {
                return handler(WriteCompletion::failed(errno));
            }
            let file = borrowed_file(fd);
            match file.write_at(&data[..cap], offset) {
                Ok(n) => handler(WriteCompletion::ok(n)),
                Err(e) => handler(WriteCompletion::failed(e.raw_os_error().unwrap_or(libc::EIO))),
            }
        });
        Ok(())
    }
}

/// Runtime driving `aio`, with a fast keepalive so tests stay quick.
pub fn runtime_with(aio: Arc<ScriptedAio>) -> Runtime {
    init_tracing();
    RuntimeBuilder::new()
        .keepalive_interval(Duration::from_millis(1))
        .with_submitter(aio)
        .build()
        .expect("runtime")
}

pub fn runtime() -> Runtime {
    init_tracing();
    RuntimeBuilder::new()
        .keepalive_interval(Duration::from_millis(1))
        .aio_workers(2)
        .build()
        .expect("runtime")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic, non-repeating-ish payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
