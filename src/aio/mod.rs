//! The native asynchronous I/O seam and the bridge built on top of it.
//!
//! An [`AioSubmitter`] accepts a read or write request, returns immediately,
//! and later invokes a completion handler exactly once from whatever thread it
//! likes. [`AsyncCompletionBridge`] turns that contract into a future a
//! cooperative task can await.

pub mod bridge;
pub mod keepalive;
pub mod threaded;

pub use bridge::{AsyncCompletionBridge, PendingOperation};
pub use keepalive::Keepalive;
pub use threaded::ThreadedAio;

use std::io;
use std::os::fd::RawFd;

/// Payload delivered to a read completion handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCompletion {
    /// Bytes read; `None` when the operation failed.
    pub data: Option<Vec<u8>>,
    /// Bytes read, or a negative value on failure.
    pub result: isize,
    /// Native error number, meaningful when `result` is negative.
    pub errno: i32,
}

/// Payload delivered to a write completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCompletion {
    /// Bytes confirmed written, or a negative value on failure.
    pub result: isize,
    pub errno: i32,
}

impl ReadCompletion {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            result: data.len() as isize,
            data: Some(data),
            errno: 0,
        }
    }

    pub fn failed(errno: i32) -> Self {
        Self {
            data: None,
            result: -1,
            errno,
        }
    }
}

impl WriteCompletion {
    pub fn ok(written: usize) -> Self {
        Self {
            result: written as isize,
            errno: 0,
        }
    }

    pub fn failed(errno: i32) -> Self {
        Self { result: -1, errno }
    }
}

pub type ReadHandler = Box<dyn FnOnce(ReadCompletion) + Send + 'static>;
pub type WriteHandler = Box<dyn FnOnce(WriteCompletion) + Send + 'static>;

/// A native asynchronous I/O primitive.
///
/// Implementations must either return `Err` without ever calling the handler
/// (the request was not queued), or return `Ok` and call the handler exactly
/// once later. The handler may run on any thread.
pub trait AioSubmitter: Send + Sync {
    fn submit_read(
        &self,
        fd: RawFd,
        offset: u64,
        len: usize,
        handler: ReadHandler,
    ) -> io::Result<()>;

    fn submit_write(
        &self,
        fd: RawFd,
        data: Vec<u8>,
        offset: u64,
        handler: WriteHandler,
    ) -> io::Result<()>;
}
