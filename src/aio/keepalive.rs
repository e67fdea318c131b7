//! Keepalive tick.
//!
//! Completions are delivered on foreign threads and only flip a flag. An
//! open file keeps a task sleeping for a short fixed interval in a loop;
//! every expiry turns the reactor, which then wakes any task whose completion
//! has landed. Completion-to-resume latency is bounded by the interval.

use crate::reactor::sleep;
use crate::task::Task;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

/// Handle to a running keepalive task. Stops the task when dropped.
pub struct Keepalive {
    stop: Rc<Cell<bool>>,
}

impl Keepalive {
    /// Spawns a keepalive task on the current runtime.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn start(interval: Duration) -> Self {
        let stop = Rc::new(Cell::new(false));

        // Detached: the task exits on its first tick after `stop`.
        Task::spawn({
            let stop = stop.clone();
            async move {
                let mut ticks = 0u64;
                while !stop.get() {
                    sleep(interval).await;
                    ticks += 1;
                    trace!(ticks, "keepalive tick");
                }
            }
        });

        Self { stop }
    }

    /// Asks the task to exit. It finishes at its next tick.
    pub fn stop(&self) {
        self.stop.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.get()
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.stop();
    }
}
