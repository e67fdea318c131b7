//! Callback-to-future bridge.
//!
//! Each submission gets a fresh [`Slot`]: the completion handler is its only
//! writer and the [`PendingOperation`] its only reader. The handler runs on a
//! foreign thread, so it never touches a waker. It fills the slot, flips the
//! resolved flag, and optionally pokes the reactor's wake pipe. The reactor,
//! back on the runtime thread, sees the flag on its next turn and wakes the
//! task that registered interest.

use super::{AioSubmitter, ReadCompletion, WriteCompletion};
use crate::error::{AioError, Result};
use crate::reactor::Notifier;
use crate::reactor::core::{ReactorHandle, Resolved};
use crate::runtime::context::current_reactor;

use std::future::Future;
use std::io;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tracing::{debug, warn};

/// Single-resolution cell written by a completion handler.
pub(crate) struct Slot<T> {
    value: Mutex<Option<T>>,
    resolved: AtomicBool,
}

impl<T: Send> Slot<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            resolved: AtomicBool::new(false),
        }
    }

    fn resolve(&self, value: T) {
        let mut guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        if self.resolved.load(Ordering::Acquire) {
            warn!("completion delivered twice, ignoring the second one");
            return;
        }
        *guard = Some(value);
        self.resolved.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<T> {
        if !self.resolved.load(Ordering::Acquire) {
            return None;
        }
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T: Send> Resolved for Slot<T> {
    fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

/// Submits operations to a native primitive and hands back awaitable results.
#[derive(Clone)]
pub struct AsyncCompletionBridge {
    submitter: Arc<dyn AioSubmitter>,
    notifier: Option<Notifier>,
}

impl AsyncCompletionBridge {
    /// Bridge whose completions are noticed on the next reactor turn only.
    /// Files using it run a keepalive tick.
    pub fn new(submitter: Arc<dyn AioSubmitter>) -> Self {
        Self {
            submitter,
            notifier: None,
        }
    }

    /// Bridge that also wakes the reactor through `notifier` on every
    /// completion, so no keepalive tick is needed.
    pub fn with_notifier(submitter: Arc<dyn AioSubmitter>, notifier: Notifier) -> Self {
        Self {
            submitter,
            notifier: Some(notifier),
        }
    }

    /// Whether completions wake the reactor directly.
    pub fn notifies_reactor(&self) -> bool {
        self.notifier.is_some()
    }

    /// Submits a read of `len` bytes at `offset`.
    pub fn submit_read(
        &self,
        fd: RawFd,
        len: usize,
        offset: u64,
    ) -> PendingOperation<ReadCompletion> {
        debug!(fd, offset, len, "submitting aio read");

        let slot = Arc::new(Slot::new());
        let target = slot.clone();
        let notifier = self.notifier.clone();

        let submitted = self.submitter.submit_read(
            fd,
            offset,
            len,
            Box::new(move |done: ReadCompletion| {
                target.resolve(done);
                if let Some(notifier) = notifier {
                    notifier.notify();
                }
            }),
        );

        PendingOperation::new(slot, submitted)
    }

    /// Submits a write of `data` at `offset`. The primitive owns the bytes
    /// until it completes.
    pub fn submit_write(
        &self,
        fd: RawFd,
        data: Vec<u8>,
        offset: u64,
    ) -> PendingOperation<WriteCompletion> {
        debug!(fd, offset, len = data.len(), "submitting aio write");

        let slot = Arc::new(Slot::new());
        let target = slot.clone();
        let notifier = self.notifier.clone();

        let submitted = self.submitter.submit_write(
            fd,
            data,
            offset,
            Box::new(move |done: WriteCompletion| {
                target.resolve(done);
                if let Some(notifier) = notifier {
                    notifier.notify();
                }
            }),
        );

        PendingOperation::new(slot, submitted)
    }
}

impl std::fmt::Debug for AsyncCompletionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCompletionBridge")
            .field("notifies_reactor", &self.notifies_reactor())
            .finish_non_exhaustive()
    }
}

enum State<T> {
    Rejected(io::Error),
    Waiting(Arc<Slot<T>>),
    Done,
}

/// One outstanding submission.
///
/// Resolves exactly once: to `Err(AioError::Submission)` if the primitive
/// refused the request, otherwise to the raw completion payload. Interpreting
/// the result code is left to the caller. There is no cancellation; dropping
/// the future abandons the result but the operation still runs.
pub struct PendingOperation<T> {
    state: State<T>,
    watch: Option<(ReactorHandle, u64)>,
}

impl<T: Send + 'static> PendingOperation<T> {
    fn new(slot: Arc<Slot<T>>, submitted: io::Result<()>) -> Self {
        let state = match submitted {
            Ok(()) => State::Waiting(slot),
            Err(err) => {
                debug!(%err, "aio submission rejected");
                State::Rejected(err)
            }
        };
        Self { state, watch: None }
    }
}

impl<T: Send + 'static> Future for PendingOperation<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match std::mem::replace(&mut this.state, State::Done) {
            State::Rejected(err) => Poll::Ready(Err(AioError::Submission(err))),
            State::Done => panic!("PendingOperation polled after completion"),
            State::Waiting(slot) => {
                if let Some(value) = slot.take() {
                    this.unwatch();
                    return Poll::Ready(Ok(value));
                }

                let (reactor, id) = match this.watch.take() {
                    Some((reactor, id)) => (reactor, Some(id)),
                    None => (current_reactor(), None),
                };
                let target: Arc<dyn Resolved> = slot.clone();
                let id = reactor.borrow_mut().watch_completion(id, target, cx.waker());

                this.watch = Some((reactor, id));
                this.state = State::Waiting(slot);
                Poll::Pending
            }
        }
    }
}

impl<T> PendingOperation<T> {
    fn unwatch(&mut self) {
        if let Some((reactor, id)) = self.watch.take() {
            if let Ok(mut reactor) = reactor.try_borrow_mut() {
                reactor.unwatch(id);
            }
        }
    }
}

impl<T> Drop for PendingOperation<T> {
    fn drop(&mut self) {
        self.unwatch();
    }
}
