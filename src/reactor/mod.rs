//! Reactor: timers, completion watchers and the wake pipe.
//!
//! The reactor never performs I/O itself. File operations are submitted to a
//! native primitive that completes on its own threads; the reactor only
//! notices that a completion slot was filled and wakes the task waiting on it.

pub mod core;
pub(crate) mod poller;
pub mod sleep;

pub use poller::Notifier;
pub use sleep::{Sleep, YieldNow, sleep, yield_now};
