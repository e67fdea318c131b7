//! Error taxonomy for buffered async file operations.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AioError>;

/// Which kind of native operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Read => f.write_str("read"),
            OpKind::Write => f.write_str("write"),
        }
    }
}

/// Errors surfaced by the bridge and by [`AioFile`](crate::fs::AioFile).
///
/// Nothing is retried internally except partial writes, which are not errors.
#[derive(Debug, Error)]
pub enum AioError {
    /// The native primitive refused to queue the operation.
    #[error("aio submission failed: {0}")]
    Submission(#[source] io::Error),

    /// The completion callback reported a negative result.
    #[error("aio {op} error {errno}")]
    Completion { op: OpKind, errno: i32 },

    /// The native layer confirmed zero bytes for a non-empty write.
    #[error("aio write confirmed zero bytes")]
    WriteZero,

    /// Caller misuse: wrong capability, bad mode or whence, negative seek,
    /// use after close.
    #[error("usage error: {0}")]
    Usage(String),

    /// Open or metadata failure from the OS layer.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AioError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        AioError::Usage(msg.into())
    }

    /// Native error number carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            AioError::Submission(e) | AioError::Io(e) => e.raw_os_error(),
            AioError::Completion { errno, .. } => Some(*errno),
            AioError::Usage(_) | AioError::WriteZero => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, AioError::Usage(_))
    }
}

impl From<AioError> for io::Error {
    fn from(err: AioError) -> Self {
        match err {
            AioError::Submission(e) | AioError::Io(e) => e,
            AioError::Completion { errno, .. } => io::Error::from_raw_os_error(errno),
            AioError::WriteZero => {
                io::Error::new(io::ErrorKind::WriteZero, "write returned zero bytes")
            }
            AioError::Usage(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
        }
    }
}
