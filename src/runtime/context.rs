//! Thread-local runtime context.
//!
//! While `Runtime::block_on` is running, the runtime's handle is stored here so
//! that `Task::spawn`, `sleep` and `AioFile::open` work without an explicit
//! runtime reference.

use super::queue::TaskQueue;
use crate::aio::AsyncCompletionBridge;
use crate::reactor::core::ReactorHandle;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Everything a task needs from the runtime it runs on.
#[derive(Clone)]
pub(crate) struct RuntimeHandle {
    pub(crate) queue: Rc<TaskQueue>,
    pub(crate) reactor: ReactorHandle,
    pub(crate) bridge: AsyncCompletionBridge,
    pub(crate) keepalive_interval: Duration,
}

thread_local! {
    static CURRENT: RefCell<Option<RuntimeHandle>> = const { RefCell::new(None) };
}

/// Runs `f` with `handle` installed as the current runtime context.
///
/// The previous context is restored afterwards, so nested runtimes on the same
/// thread see their own handle.
pub(crate) fn enter_context<F, R>(handle: RuntimeHandle, f: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<RuntimeHandle>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }

    let previous = CURRENT.with(|current| current.borrow_mut().replace(handle));
    let _restore = Restore(previous);

    f()
}

/// Returns the current runtime handle, if called from inside `block_on`.
pub(crate) fn try_current() -> Option<RuntimeHandle> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Returns the current runtime handle.
///
/// # Panics
/// Panics if called outside of a runtime context.
pub(crate) fn current() -> RuntimeHandle {
    try_current().expect("called outside of a runtime context")
}

pub(crate) fn current_reactor() -> ReactorHandle {
    current().reactor
}

/// Bridge to the native primitive of the runtime this thread is driving.
///
/// Returns `None` outside of `Runtime::block_on`.
pub fn current_bridge() -> Option<AsyncCompletionBridge> {
    CURRENT.with(|current| current.borrow().as_ref().map(|h| h.bridge.clone()))
}
