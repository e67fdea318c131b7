//! Fluent builder for Runtime construction.
//!
//! All runtime configuration lives here: the keepalive tick period, the size
//! of the default native I/O pool, whether completions wake the reactor
//! directly, and an optional replacement primitive.

use crate::aio::{AioSubmitter, AsyncCompletionBridge, ThreadedAio};
use crate::reactor::core::Reactor;
use crate::runtime::Runtime;
use crate::runtime::TaskQueue;
use crate::runtime::context::RuntimeHandle;

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Period of the per-file keepalive tick.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

/// Worker threads in the default [`ThreadedAio`] pool.
pub const DEFAULT_AIO_WORKERS: usize = 4;

/// Builder for [`Runtime`].
///
/// ```ignore
/// let rt = RuntimeBuilder::new()
///     .keepalive_interval(Duration::from_millis(2))
///     .aio_workers(2)
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    keepalive_interval: Duration,
    aio_workers: usize,
    integrated_completion: bool,
    submitter: Option<Arc<dyn AioSubmitter>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            aio_workers: DEFAULT_AIO_WORKERS,
            integrated_completion: false,
            submitter: None,
        }
    }

    /// Sets the keepalive tick period. This bounds how long a completion can
    /// sit unnoticed, also for operations awaited with no file open. Zero is
    /// raised to one millisecond.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sets the number of worker threads for the default primitive.
    /// Ignored when a submitter is supplied.
    pub fn aio_workers(mut self, workers: usize) -> Self {
        self.aio_workers = workers.max(1);
        self
    }

    /// When enabled, every completion also writes to the reactor's wake pipe,
    /// and files opened on this runtime do not start a keepalive tick.
    pub fn integrated_completion(mut self, enabled: bool) -> Self {
        self.integrated_completion = enabled;
        self
    }

    /// Uses `submitter` instead of the default [`ThreadedAio`] pool.
    pub fn with_submitter(mut self, submitter: Arc<dyn AioSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Builds the runtime. Fails if the wake pipe or the worker threads cannot
    /// be created.
    pub fn build(self) -> io::Result<Runtime> {
        let reactor = Reactor::new(self.keepalive_interval)?;

        let submitter: Arc<dyn AioSubmitter> = match self.submitter {
            Some(submitter) => submitter,
            None => Arc::new(ThreadedAio::new(self.aio_workers)?),
        };

        let bridge = if self.integrated_completion {
            AsyncCompletionBridge::with_notifier(submitter, reactor.notifier())
        } else {
            AsyncCompletionBridge::new(submitter)
        };

        debug!(
            keepalive_interval = ?self.keepalive_interval,
            integrated_completion = self.integrated_completion,
            "runtime built"
        );

        Ok(Runtime::from_parts(RuntimeHandle {
            queue: Rc::new(TaskQueue::new()),
            reactor: Rc::new(RefCell::new(reactor)),
            bridge,
            keepalive_interval: self.keepalive_interval,
        }))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
