//! Synchronization for tasks sharing one runtime thread.

pub mod guard;

pub use guard::{Acquire, ConcurrencyGuard, Guarded};
