//! Waker implementation for task wake-up notifications.
//!
//! A task waker owns an `Rc<Task>` and reschedules that task on the run queue
//! when woken. Because the pointer inside is an `Rc`, these wakers must never
//! leave the runtime thread. Completion callbacks running on other threads do
//! not touch wakers at all: they only resolve a slot, and the reactor wakes the
//! task from the runtime thread (see [`crate::aio::bridge`]).

use crate::task::Task;

use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Vtable entries operating on a leaked `Rc<Task>`.
struct TaskWaker;

impl TaskWaker {
    fn clone_raw(ptr: *const ()) -> RawWaker {
        // SAFETY: `ptr` was produced by `Rc::into_raw` in `make_waker` or here.
        unsafe { Rc::increment_strong_count(ptr as *const Task) };
        RawWaker::new(ptr, &Self::VTABLE)
    }

    fn wake_raw(ptr: *const ()) {
        // SAFETY: consumes the reference owned by this waker.
        let task = unsafe { Rc::from_raw(ptr as *const Task) };
        task.schedule();
    }

    fn wake_by_ref_raw(ptr: *const ()) {
        // SAFETY: the reference stays owned by the waker; we only borrow it.
        let task = std::mem::ManuallyDrop::new(unsafe { Rc::from_raw(ptr as *const Task) });
        task.schedule();
    }

    fn drop_raw(ptr: *const ()) {
        // SAFETY: releases the reference owned by this waker.
        drop(unsafe { Rc::from_raw(ptr as *const Task) });
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Creates a waker that reschedules `task` when woken.
pub(crate) fn make_waker(task: Rc<Task>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(task) as *const (), &TaskWaker::VTABLE);
    // SAFETY: the vtable upholds the RawWaker contract for an `Rc<Task>`
    // pointer on the runtime thread.
    unsafe { Waker::from_raw(raw) }
}
