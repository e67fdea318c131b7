//! Task executor that processes queued tasks.

use super::queue::TaskQueue;

use std::rc::Rc;

/// Polls tasks from a shared run queue.
pub(crate) struct Executor {
    queue: Rc<TaskQueue>,
}

impl Executor {
    pub(crate) fn new(queue: Rc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Runs one pass over the tasks that were ready when the pass started.
    ///
    /// Tasks woken during the pass (for example by `yield_now`) are left for the
    /// next pass so the runtime loop gets to turn the reactor in between.
    pub(crate) fn run(&self) -> usize {
        let budget = self.queue.len();
        let mut polled = 0;

        while polled < budget {
            let Some(task) = self.queue.pop() else {
                break;
            };
            task.poll();
            polled += 1;
        }

        polled
    }
}
