//! Buffered asynchronous files.
//!
//! [`AioFile`] presents read/write/seek over a callback-driven native
//! primitive. [`OpenMode`] parses the mode strings it accepts.

mod file;
mod options;

pub use file::AioFile;
pub use options::{DEFAULT_BUFFER_SIZE, OpenMode, seek_from_whence};
