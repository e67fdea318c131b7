//! Buffered file object over the completion bridge.
//!
//! `AioFile` keeps a cursor, a read-ahead buffer and a write-behind buffer in
//! front of an [`AsyncCompletionBridge`]. Every native operation is awaited to
//! completion before the call returns, so from the caller's side reads, writes
//! and seeks look sequential even though the bytes move on other threads.
//!
//! # Concurrency
//!
//! Writers are serialized by a [`ConcurrencyGuard`] held for the whole
//! append-and-drain sequence. Readers are not guarded: reading from one task
//! while another task reads or writes the same `AioFile` must be synchronized
//! by the caller.
//!
//! # EOF
//!
//! A read that returns fewer bytes than requested is taken as end-of-stream
//! and is never retried. EOF stays set until the next seek.

use super::options::{OpenMode, WHOLE_FILE_CHUNK, seek_from_whence};
use crate::aio::{AsyncCompletionBridge, Keepalive};
use crate::error::{AioError, OpKind, Result};
use crate::runtime::context::{self, RuntimeHandle};
use crate::sync::ConcurrencyGuard;

use std::cell::{Cell, RefCell};
use std::fs::{File, Metadata};
use std::future::Future;
use std::io::{self, SeekFrom};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

#[derive(Default)]
struct Cursor {
    pos: u64,
    read_buf: Vec<u8>,
    eof: bool,
}

/// A buffered, file-like object whose I/O completes through callbacks.
///
/// ```ignore
/// let mut rt = Runtime::new()?;
/// rt.block_on(async {
///     let file = AioFile::open("/tmp/data", "w+", DEFAULT_BUFFER_SIZE)?;
///     file.write(b"hello", None).await?;
///     let back = file.read(5, Some(0)).await?;
///     assert_eq!(back.as_deref(), Some(&b"hello"[..]));
///     file.close().await
/// })?;
/// ```
pub struct AioFile {
    file: RefCell<Option<File>>,
    path: PathBuf,
    mode: OpenMode,
    buffer_size: usize,
    bridge: AsyncCompletionBridge,
    cursor: RefCell<Cursor>,
    pending: ConcurrencyGuard<Vec<u8>>,
    keepalive: RefCell<Option<Keepalive>>,
    close_started: Cell<bool>,
    closing: Cell<bool>,
}

impl AioFile {
    /// Opens `path` using the current runtime's native primitive.
    ///
    /// Must be called from inside `Runtime::block_on`.
    pub fn open(path: impl AsRef<Path>, mode: &str, buffer_size: usize) -> Result<Self> {
        let handle = runtime_handle()?;
        let bridge = handle.bridge.clone();
        Self::open_inner(path.as_ref(), mode.parse()?, buffer_size, bridge, &handle)
    }

    /// Opens `path` with an explicit bridge, for example one wrapping a
    /// different native primitive.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: &str,
        buffer_size: usize,
        bridge: AsyncCompletionBridge,
    ) -> Result<Self> {
        let handle = runtime_handle()?;
        Self::open_inner(path.as_ref(), mode.parse()?, buffer_size, bridge, &handle)
    }

    fn open_inner(
        path: &Path,
        mode: OpenMode,
        buffer_size: usize,
        bridge: AsyncCompletionBridge,
        handle: &RuntimeHandle,
    ) -> Result<Self> {
        let file = mode.open_options().open(path)?;

        let pos = if mode.is_append() {
            file.metadata()?.len()
        } else {
            0
        };

        let keepalive = if bridge.notifies_reactor() {
            None
        } else {
            Some(Keepalive::start(handle.keepalive_interval))
        };

        debug!(
            path = %path.display(),
            %mode,
            fd = file.as_raw_fd(),
            buffer_size,
            keepalive = keepalive.is_some(),
            "opened aio file"
        );

        Ok(Self {
            file: RefCell::new(Some(file)),
            path: path.to_path_buf(),
            mode,
            buffer_size,
            bridge,
            cursor: RefCell::new(Cursor {
                pos,
                ..Cursor::default()
            }),
            pending: ConcurrencyGuard::new(Vec::with_capacity(buffer_size)),
            keepalive: RefCell::new(keepalive),
            close_started: Cell::new(false),
            closing: Cell::new(false),
        })
    }

    /// Opens the file, runs `body`, and closes the file on every exit path.
    ///
    /// An error from `body` takes precedence over an error from `close`. If
    /// `body` already closed the file, it is not closed again.
    pub async fn scoped<F, Fut, T>(
        path: impl AsRef<Path>,
        mode: &str,
        buffer_size: usize,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(Rc<AioFile>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let file = Rc::new(Self::open(path, mode, buffer_size)?);
        let outcome = body(file.clone()).await;

        let closed = if file.is_closed() {
            Ok(())
        } else {
            file.close().await
        };

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(%close_err, "close failed after scoped body error");
                Err(err)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// `0` means unbuffered.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Position after the last completed operation.
    pub fn position(&self) -> u64 {
        self.cursor.borrow().pos
    }

    /// Whether the last read hit end-of-stream (cleared by seek).
    pub fn at_eof(&self) -> bool {
        self.cursor.borrow().eof
    }

    /// Bytes accepted by `write` but not yet confirmed by the native layer.
    /// Reports 0 while a writer is mid-drain.
    pub fn pending_write_len(&self) -> usize {
        self.pending.peek(Vec::len).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.file.borrow().is_none()
    }

    /// Whether this file still drives a keepalive tick.
    pub fn keepalive_active(&self) -> bool {
        self.keepalive
            .borrow()
            .as_ref()
            .is_some_and(|keepalive| !keepalive.is_stopped())
    }

    fn fd(&self) -> Result<RawFd> {
        self.file
            .borrow()
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| AioError::usage("I/O operation on closed file"))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closing.get() {
            return Err(AioError::usage("I/O operation on closed file"));
        }
        self.fd().map(|_| ())
    }

    fn buffered(&self) -> bool {
        self.buffer_size > 0
    }

    /// Synchronous `fstat` of the underlying descriptor.
    pub fn stat(&self) -> Result<Metadata> {
        let file = self.file.borrow();
        let file = file
            .as_ref()
            .ok_or_else(|| AioError::usage("I/O operation on closed file"))?;
        Ok(file.metadata()?)
    }

    fn clear_read_buf(&self) {
        self.cursor.borrow_mut().read_buf.clear();
    }

    /// Reads up to `size` bytes, or the whole remaining file when `size` is 0.
    ///
    /// `offset` seeks first when it differs from the cursor. Returns `None`
    /// when nothing could be read because the stream is at EOF; a whole-file
    /// read returns `Some` (possibly empty) instead.
    pub async fn read(&self, size: usize, offset: Option<u64>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if !self.mode.is_readable() {
            return Err(AioError::usage("file not open for reading"));
        }

        if self.buffered() && !self.mode.is_append() {
            self.flush().await?;
        }

        if let Some(offset) = offset {
            if offset != self.position() {
                self.seek(SeekFrom::Start(offset)).await?;
            }
        }

        if size == 0 {
            return self.read_to_end().await.map(Some);
        }

        self.read_sized(size).await
    }

    async fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut whole = Vec::new();
        while let Some(part) = self.read_sized(WHOLE_FILE_CHUNK).await? {
            whole.extend_from_slice(&part);
        }
        Ok(whole)
    }

    async fn read_sized(&self, size: usize) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(size);

        while out.len() < size {
            let need = size - out.len();

            let refill = {
                let cursor = self.cursor.borrow();
                cursor.read_buf.len() < need && !cursor.eof
            };
            if refill {
                self.fill_read_buf(need).await?;
            }

            let mut cursor = self.cursor.borrow_mut();
            let take = need.min(cursor.read_buf.len());
            out.extend(cursor.read_buf.drain(..take));

            if cursor.read_buf.is_empty() && cursor.eof {
                break;
            }
        }

        if out.is_empty() && self.at_eof() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Issues one native read at the cursor and appends the result to the
    /// read-ahead buffer.
    async fn fill_read_buf(&self, need: usize) -> Result<()> {
        let request = if self.buffered() {
            self.buffer_size
        } else {
            need
        };
        let fd = self.fd()?;
        let offset = self.position();

        let done = self.bridge.submit_read(fd, request, offset).await?;
        if done.result < 0 {
            return Err(AioError::Completion {
                op: OpKind::Read,
                errno: done.errno,
            });
        }

        let read = done.result as usize;
        let data = done.data.unwrap_or_default();

        let mut cursor = self.cursor.borrow_mut();
        cursor.pos = offset + read as u64;
        cursor.read_buf.extend_from_slice(&data[..read.min(data.len())]);
        if read == 0 || read < request {
            cursor.eof = true;
        }

        debug!(fd, offset, request, read, eof = cursor.eof, "aio read completed");
        Ok(())
    }

    /// Accepts `buf` for writing and returns `buf.len()`.
    ///
    /// Bytes are confirmed by the native layer once the write-behind buffer
    /// reaches `buffer_size`, on `flush`, on a non-append seek, or on close.
    /// In append mode `offset` is ignored and every submission targets the
    /// current end-of-file.
    pub async fn write(&self, buf: &[u8], offset: Option<u64>) -> Result<usize> {
        self.ensure_open()?;
        if !self.mode.is_writable() {
            return Err(AioError::usage("file not open for writing"));
        }

        if !self.buffered() {
            return self.write_unbuffered(buf, offset).await;
        }

        let mut pending = self.pending.lock().await;
        self.ensure_open()?;

        if !self.mode.is_append() {
            self.clear_read_buf();
            if let Some(offset) = offset {
                if offset != self.position() {
                    self.seek_locked(Some(&mut *pending), SeekFrom::Start(offset))
                        .await?;
                }
            }
        }

        pending.extend_from_slice(buf);
        self.drain(&mut pending, false).await?;

        Ok(buf.len())
    }

    async fn write_unbuffered(&self, buf: &[u8], offset: Option<u64>) -> Result<usize> {
        if !self.mode.is_append() {
            self.clear_read_buf();
            if let Some(offset) = offset {
                if offset != self.position() {
                    self.seek_locked(None, SeekFrom::Start(offset)).await?;
                }
            }
        }

        let mut rest = buf;
        while !rest.is_empty() {
            let written = self.submit_write(rest).await?;
            rest = &rest[written..];
        }

        Ok(buf.len())
    }

    /// Submits from the front of `pending` until it drops below the
    /// threshold, or until it is empty when `force` is set.
    async fn drain(&self, pending: &mut Vec<u8>, force: bool) -> Result<()> {
        while !pending.is_empty() && (force || pending.len() >= self.buffer_size) {
            let chunk = pending.len().min(self.buffer_size);
            let written = self.submit_write(&pending[..chunk]).await?;
            pending.drain(..written);
        }
        Ok(())
    }

    /// One native write; returns the confirmed count, which may be short.
    async fn submit_write(&self, bytes: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        let offset = if self.mode.is_append() {
            self.stat()?.len()
        } else {
            self.position()
        };

        let done = self
            .bridge
            .submit_write(fd, bytes.to_vec(), offset)
            .await?;
        if done.result < 0 {
            return Err(AioError::Completion {
                op: OpKind::Write,
                errno: done.errno,
            });
        }

        let written = (done.result as usize).min(bytes.len());
        if written == 0 {
            return Err(AioError::WriteZero);
        }

        self.cursor.borrow_mut().pos = offset + written as u64;
        debug!(
            fd,
            offset,
            submitted = bytes.len(),
            written,
            "aio write completed"
        );
        Ok(written)
    }

    /// Moves the cursor. Drains pending writes first unless in append mode;
    /// always discards read-ahead and clears EOF.
    pub async fn seek(&self, pos: SeekFrom) -> Result<u64> {
        self.ensure_open()?;

        if self.mode.is_writable() && self.buffered() && !self.mode.is_append() {
            let mut pending = self.pending.lock().await;
            self.seek_locked(Some(&mut *pending), pos).await
        } else {
            self.seek_locked(None, pos).await
        }
    }

    /// [`seek`](Self::seek) with a raw `lseek(2)`-style `whence`.
    pub async fn seek_whence(&self, pos: i64, whence: i32) -> Result<u64> {
        self.seek(seek_from_whence(pos, whence)?).await
    }

    async fn seek_locked(&self, pending: Option<&mut Vec<u8>>, pos: SeekFrom) -> Result<u64> {
        let queued = pending.as_ref().map_or(0, |pending| pending.len() as u64);

        // Reject before any buffered byte is submitted.
        self.seek_target(pos, queued)?;

        if let Some(pending) = pending {
            self.drain(pending, true).await?;
        }
        let target = self.seek_target(pos, 0)?;

        let mut cursor = self.cursor.borrow_mut();
        cursor.read_buf.clear();
        cursor.eof = false;
        cursor.pos = target;

        Ok(target)
    }

    /// Absolute offset `pos` resolves to once `queued` buffered bytes have
    /// landed at the cursor.
    fn seek_target(&self, pos: SeekFrom, queued: u64) -> Result<u64> {
        let here = i128::from(self.position()) + i128::from(queued);
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => here + i128::from(delta),
            SeekFrom::End(delta) => {
                let len = i128::from(self.stat()?.len());
                let end = if queued > 0 { len.max(here) } else { len };
                end + i128::from(delta)
            }
        };
        u64::try_from(target).map_err(|_| AioError::usage("file position invalid, less than 0"))
    }

    /// Drains the write-behind buffer completely.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.mode.is_writable() || !self.buffered() {
            return Ok(());
        }

        let mut pending = self.pending.lock().await;
        self.drain(&mut pending, true).await
    }

    /// Flushes, stops the keepalive tick and closes the descriptor.
    ///
    /// The descriptor is released even when the flush fails; the flush error
    /// is returned. Any use afterwards, including a second `close` (also one
    /// started while the first is still flushing), is a usage error.
    pub async fn close(&self) -> Result<()> {
        self.ensure_open()?;
        if self.close_started.replace(true) {
            return Err(AioError::usage("file is already being closed"));
        }

        let flushed = self.flush().await;
        self.closing.set(true);

        // Let a writer that queued behind the flush observe the close.
        let _pending = self.pending.lock().await;

        if let Some(keepalive) = self.keepalive.borrow_mut().take() {
            keepalive.stop();
        }

        let closed = match self.file.borrow_mut().take() {
            Some(file) => close_fd(file),
            None => Ok(()),
        };

        debug!(path = %self.path.display(), "closed aio file");

        flushed?;
        closed.map_err(AioError::from)
    }
}

fn runtime_handle() -> Result<RuntimeHandle> {
    context::try_current()
        .ok_or_else(|| AioError::usage("AioFile must be opened inside Runtime::block_on"))
}

fn close_fd(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    if unsafe { libc::close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Drop for AioFile {
    fn drop(&mut self) {
        if self.file.get_mut().is_none() {
            return;
        }

        let unconfirmed = self.pending.get_mut().len();
        if unconfirmed > 0 {
            warn!(
                path = %self.path.display(),
                unconfirmed,
                "aio file dropped without close, discarding buffered writes"
            );
        }
    }
}

impl std::fmt::Debug for AioFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AioFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("buffer_size", &self.buffer_size)
            .field("position", &self.position())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
