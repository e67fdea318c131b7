//! Run queue of tasks that are ready to be polled.
//!
//! The runtime is single-threaded, so the queue is a plain `RefCell` around a
//! `VecDeque`. Tasks are pushed when woken and popped by the executor in FIFO
//! order.

use crate::task::Task;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// FIFO queue of scheduled tasks.
pub(crate) struct TaskQueue {
    queue: RefCell<VecDeque<Rc<Task>>>,
}

impl TaskQueue {
    /// Creates a new empty task queue.
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    /// Enqueues a task at the back of the queue.
    pub(crate) fn push(&self, task: Rc<Task>) {
        self.queue.borrow_mut().push_back(task);
    }

    /// Dequeues the next ready task, if any.
    pub(crate) fn pop(&self) -> Option<Rc<Task>> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Removes every queued task and hands them back to the caller, so they are
    /// dropped outside of the queue borrow.
    pub(crate) fn drain(&self) -> Vec<Rc<Task>> {
        self.queue.borrow_mut().drain(..).collect()
    }
}
