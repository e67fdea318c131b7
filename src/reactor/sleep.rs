//! Sleep futures for asynchronous delays.
//!
//! Provides a `Sleep` future backed by reactor timers, and `yield_now` for
//! handing control back to the scheduler for one pass.

use crate::reactor::core::ReactorHandle;
use crate::runtime::context::current_reactor;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// A future that completes once its deadline has passed.
pub struct Sleep {
    deadline: Instant,
    reactor: ReactorHandle,
    timer: Option<u64>,
}

impl Sleep {
    /// Creates a sleep future on the current runtime's reactor.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn new(duration: Duration) -> Self {
        Self::new_with_reactor(duration, current_reactor())
    }

    /// Creates a sleep future on an explicit reactor.
    pub fn new_with_reactor(duration: Duration, reactor: ReactorHandle) -> Self {
        Self {
            deadline: Instant::now() + duration,
            reactor,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Creates a sleep future for the given duration.
///
/// ```ignore
/// sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if Instant::now() >= this.deadline {
            if let Some(id) = this.timer.take() {
                this.reactor.borrow_mut().cancel_timer(id);
            }
            return Poll::Ready(());
        }

        let mut reactor = this.reactor.borrow_mut();
        let refreshed = match this.timer {
            Some(id) => reactor.update_timer(id, cx.waker()),
            None => false,
        };
        if !refreshed {
            this.timer = Some(reactor.register_timer(this.deadline, cx.waker().clone()));
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            if let Ok(mut reactor) = self.reactor.try_borrow_mut() {
                reactor.cancel_timer(id);
            }
        }
    }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Lets every other ready task run once before resuming.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}
