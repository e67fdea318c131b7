//! Single-threaded cooperative runtime.
//!
//! # Main Event Loop
//!
//! `block_on` drives everything on the calling thread:
//! 1. Polls the main future
//! 2. Runs one pass over the ready tasks
//! 3. Turns the reactor without blocking and wakes what became ready
//! 4. When nothing is runnable, blocks in the reactor until the next timer
//!    deadline or a wake-pipe notification
//!
//! Completions from the native I/O primitive arrive on other threads. They
//! are noticed on the next reactor turn, which the per-file keepalive tick
//! guarantees happens within one tick period.
//!
//! # Usage
//!
//! ```ignore
//! let mut rt = Runtime::new()?;
//! let result = rt.block_on(async { 42 });
//! assert_eq!(result, 42);
//! ```

use crate::reactor::core::wake_ready;
use crate::runtime::context::{RuntimeHandle, enter_context};
use crate::runtime::Executor;
use crate::task::{JoinHandle, Task};

use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

/// Main async runtime for executing futures.
pub struct Runtime {
    handle: RuntimeHandle,
    executor: Executor,
}

/// Waker for the future passed to `block_on`.
#[derive(Default)]
struct MainWaker {
    notified: AtomicBool,
}

impl MainWaker {
    fn take(&self) -> bool {
        self.notified.swap(false, Ordering::AcqRel)
    }
}

impl Wake for MainWaker {
    fn wake(self: Arc<Self>) {
        self.notified.store(true, Ordering::Release);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
    }
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    ///
    /// Equivalent to `RuntimeBuilder::new().build()`.
    pub fn new() -> io::Result<Self> {
        crate::builder::RuntimeBuilder::new().build()
    }

    pub(crate) fn from_parts(handle: RuntimeHandle) -> Self {
        let executor = Executor::new(handle.queue.clone());
        Self { handle, executor }
    }

    /// Spawns a task onto this runtime.
    ///
    /// The task first runs when `block_on` drains the run queue.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        Task::spawn_on(&self.handle.queue, fut)
    }

    /// Runs `fut` to completion, driving spawned tasks and the reactor along
    /// the way.
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        enter_context(self.handle.clone(), || {
            let mut fut = pin!(fut);

            let main = Arc::new(MainWaker::default());
            let waker = Waker::from(main.clone());
            let mut cx = Context::from_waker(&waker);

            loop {
                if let Poll::Ready(val) = fut.as_mut().poll(&mut cx) {
                    // Give tasks released by the main future one last pass.
                    self.executor.run();
                    return val;
                }

                loop {
                    self.executor.run();

                    self.handle.reactor.borrow_mut().poll_events();
                    wake_ready(&self.handle.reactor);

                    if main.take() {
                        break;
                    }

                    if !self.handle.queue.is_empty() {
                        continue;
                    }

                    self.handle.reactor.borrow_mut().wait_for_event();
                    wake_ready(&self.handle.reactor);

                    if main.take() {
                        break;
                    }
                }
            }
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tasks parked in the reactor hold the reactor through their futures;
        // release both sides outside of any borrow to break the cycle.
        let parked = self.handle.reactor.borrow_mut().shutdown();
        let queued = self.handle.queue.drain();
        drop(parked);
        drop(queued);
    }
}
