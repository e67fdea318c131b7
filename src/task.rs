//! Tasks, join handles and join sets.
//!
//! # Task Spawning
//!
//! Tasks are spawned with [`Task::spawn`] from inside `Runtime::block_on`:
//!
//! ```ignore
//! let handle = Task::spawn(async { 42 });
//! assert_eq!(handle.await, 42);
//! ```
//!
//! # How Tasks Work
//!
//! 1. A future is wrapped in a [`Task`] and pushed onto the run queue
//! 2. The executor polls it with a waker that points back at the task
//! 3. On `Poll::Pending` the future stays parked inside the task
//! 4. A timer, a resolved completion or another task wakes it, which pushes
//!    it back onto the run queue (at most once until it is polled again)
//! 5. On `Poll::Ready` the future is dropped and join waiters are woken

use crate::runtime::context;
use crate::runtime::{TaskQueue, make_waker};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

/// A spawned unit of work.
///
/// Tasks are created via [`Task::spawn`] or [`Runtime::spawn`](crate::Runtime::spawn)
/// and are never constructed directly in user code.
pub struct Task {
    future: RefCell<Option<BoxFuture>>,
    queue: Rc<TaskQueue>,
    scheduled: Cell<bool>,
}

impl Task {
    fn new(fut: impl Future<Output = ()> + 'static, queue: Rc<TaskQueue>) -> Rc<Self> {
        Rc::new(Task {
            future: RefCell::new(Some(Box::pin(fut))),
            queue,
            scheduled: Cell::new(false),
        })
    }

    /// Pushes the task onto its run queue unless it is already there.
    pub(crate) fn schedule(self: &Rc<Self>) {
        if !self.scheduled.replace(true) {
            self.queue.push(self.clone());
        }
    }

    /// Polls the wrapped future once.
    pub(crate) fn poll(self: &Rc<Self>) {
        self.scheduled.set(false);

        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        let mut slot = self.future.borrow_mut();
        let finished = match slot.as_mut() {
            Some(fut) => fut.as_mut().poll(&mut cx).is_ready(),
            None => false,
        };

        if finished {
            let fut = slot.take();
            drop(slot);
            drop(fut);
        }
    }

    /// Spawns a task on the current runtime and returns its [`JoinHandle`].
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let queue = context::current().queue;
        Self::spawn_on(&queue, fut)
    }

    pub(crate) fn spawn_on<F>(queue: &Rc<TaskQueue>, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let state = Rc::new(JoinState::new());
        let completion = state.clone();

        let task = Task::new(
            async move {
                let output = fut.await;
                completion.complete(output);
            },
            queue.clone(),
        );
        task.schedule();

        JoinHandle { state }
    }
}

struct JoinState<T> {
    output: RefCell<Option<T>>,
    finished: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

impl<T> JoinState<T> {
    fn new() -> Self {
        Self {
            output: RefCell::new(None),
            finished: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
        }
    }

    fn complete(&self, output: T) {
        *self.output.borrow_mut() = Some(output);
        self.finished.set(true);

        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }
}

/// A future that resolves to the output of a spawned task.
///
/// Dropping the handle detaches the task; it keeps running.
pub struct JoinHandle<T> {
    state: Rc<JoinState<T>>,
}

impl<T> JoinHandle<T> {
    /// Whether the task has run to completion.
    pub fn is_finished(&self) -> bool {
        self.state.finished.get()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if let Some(output) = self.state.output.borrow_mut().take() {
            return Poll::Ready(output);
        }

        assert!(
            !self.state.finished.get(),
            "JoinHandle polled after its output was taken"
        );

        self.state.waiters.borrow_mut().push(cx.waker().clone());
        Poll::Pending
    }
}

/// Collects several [`JoinHandle`]s and awaits them all.
pub struct JoinSet<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> JoinSet<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: JoinHandle<T>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Awaits every handle in insertion order and returns their outputs.
    pub async fn await_all(&mut self) -> Vec<T> {
        let mut outputs = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            outputs.push(handle.await);
        }
        outputs
    }
}

impl<T> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
