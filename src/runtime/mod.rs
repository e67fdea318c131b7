//! Cooperative runtime: run queue, wakers, executor and `block_on`.

pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod executor;
pub(crate) mod queue;
pub(crate) mod waker;

pub use context::current_bridge;
pub use self::core::Runtime;

pub(crate) use executor::Executor;
pub(crate) use queue::TaskQueue;
pub(crate) use waker::make_waker;
