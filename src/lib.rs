//! Buffered file objects over a callback-driven asynchronous I/O primitive.
//!
//! This crate gives a cooperative, single-threaded runtime synchronous-looking
//! file semantics (read, write, seek, flush, close) on top of a native
//! primitive that accepts a request and reports completion later through a
//! callback on some other thread.
//!
//! # Core Components
//!
//! ## Runtime
//! [`Runtime`] drives a main future with [`block_on`](Runtime::block_on) and
//! runs spawned [`Task`]s on the same thread. Tasks suspend only at await
//! points.
//!
//! ## Completion bridge
//! [`AsyncCompletionBridge`] submits an operation to an [`AioSubmitter`] and
//! returns a [`PendingOperation`] that resolves exactly once with the
//! completion payload. The default primitive, [`ThreadedAio`], runs
//! `pread`/`pwrite` on worker threads.
//!
//! ## Files
//! [`AioFile`] owns the descriptor, the cursor, a read-ahead buffer, a
//! write-behind buffer and the EOF flag, and serializes concurrent writers
//! with a [`ConcurrencyGuard`].
//!
//! ```ignore
//! use aiofile::{AioFile, Runtime};
//!
//! let mut rt = Runtime::new()?;
//! rt.block_on(async {
//!     AioFile::scoped("/tmp/example", "w+", 4096, |file| async move {
//!         file.write(b"hello world", None).await?;
//!         let head = file.read(5, Some(0)).await?;
//!         assert_eq!(head.as_deref(), Some(&b"hello"[..]));
//!         Ok(())
//!     })
//!     .await
//! })?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! caller ─► AioFile ─► AsyncCompletionBridge ─► AioSubmitter (worker thread)
//!              ▲                                        │
//!              │                          completion fills slot
//!              │                                        ▼
//!         task re-queued ◄── Reactor notices slot ◄── keepalive tick / wake pipe
//! ```
//!
//! # Limitations
//!
//! - **Single-threaded**: all tasks run on the thread calling `block_on`
//! - **Linux**: the reactor uses `pipe2` and `poll`
//! - **Readers are unguarded**: concurrent read and write on one file need
//!   external synchronization
//! - **No cancellation**: a submitted operation always runs to completion

pub mod aio;
pub mod builder;
pub mod error;
pub mod fs;
pub mod reactor;
pub mod runtime;
pub mod sync;
pub mod task;

pub use aio::{
    AioSubmitter, AsyncCompletionBridge, Keepalive, PendingOperation, ReadCompletion,
    ThreadedAio, WriteCompletion,
};
pub use builder::RuntimeBuilder;
pub use error::{AioError, OpKind, Result};
pub use fs::{AioFile, DEFAULT_BUFFER_SIZE, OpenMode};
pub use reactor::{sleep, yield_now};
pub use runtime::Runtime;
pub use sync::ConcurrencyGuard;
pub use task::{JoinHandle, JoinSet, Task};
