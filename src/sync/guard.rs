//! Async mutex serializing writers on one file.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// A single-threaded async mutex.
///
/// A holder may keep the lock across await points; waiting tasks are parked
/// and woken one at a time in arrival order as the lock is released. Barging
/// is allowed: a task that tries the lock between a release and the woken
/// waiter's next poll may take it first, and the waiter parks again at the
/// back. The lock is not reentrant: code already holding a [`Guarded`] must
/// pass it down rather than lock again.
pub struct ConcurrencyGuard<T> {
    locked: Cell<bool>,
    waiters: RefCell<VecDeque<Waker>>,
    data: UnsafeCell<T>,
}

impl<T> ConcurrencyGuard<T> {
    pub fn new(value: T) -> Self {
        Self {
            locked: Cell::new(false),
            waiters: RefCell::new(VecDeque::new()),
            data: UnsafeCell::new(value),
        }
    }

    /// Waits until the lock is free and takes it.
    pub fn lock(&self) -> Acquire<'_, T> {
        Acquire {
            guard: self,
            parked: None,
        }
    }

    pub fn try_lock(&self) -> Option<Guarded<'_, T>> {
        if self.locked.replace(true) {
            return None;
        }
        Some(Guarded { guard: self })
    }

    /// Reads the value if the lock is free, without taking it. Parked
    /// waiters are left untouched.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        if self.locked.get() {
            return None;
        }
        // SAFETY: unlocked means no `Guarded` exists, so no `&mut T` is live,
        // and the type is !Sync.
        Some(f(unsafe { &*self.data.get() }))
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn unlock(&self) {
        self.locked.set(false);
        self.wake_next();
    }

    fn wake_next(&self) {
        let next = self.waiters.borrow_mut().pop_front();
        if let Some(waker) = next {
            waker.wake();
        }
    }
}

impl<T: Default> Default for ConcurrencyGuard<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for ConcurrencyGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("locked", &self.locked.get())
            .field("waiters", &self.waiters.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Future returned by [`ConcurrencyGuard::lock`].
pub struct Acquire<'a, T> {
    guard: &'a ConcurrencyGuard<T>,
    parked: Option<Waker>,
}

impl<'a, T> Future for Acquire<'a, T> {
    type Output = Guarded<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(held) = this.guard.try_lock() {
            this.parked = None;
            return Poll::Ready(held);
        }

        let mut waiters = this.guard.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
            waiters.push_back(cx.waker().clone());
        }
        this.parked = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for Acquire<'_, T> {
    fn drop(&mut self) {
        let Some(parked) = self.parked.take() else {
            return;
        };

        let mut waiters = self.guard.waiters.borrow_mut();
        let before = waiters.len();
        waiters.retain(|w| !w.will_wake(&parked));
        let was_queued = waiters.len() != before;
        drop(waiters);

        // A wake-up already handed to us must not be lost.
        if !was_queued && !self.guard.is_locked() {
            self.guard.wake_next();
        }
    }
}

/// Exclusive access to the protected value, released on drop.
pub struct Guarded<'a, T> {
    guard: &'a ConcurrencyGuard<T>,
}

impl<T> Deref for Guarded<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `locked` is set for as long as this value exists, and the
        // type is !Sync, so no other reference to `data` can be live.
        unsafe { &*self.guard.data.get() }
    }
}

impl<T> DerefMut for Guarded<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `deref`.
        unsafe { &mut *self.guard.data.get() }
    }
}

impl<T> Drop for Guarded<'_, T> {
    fn drop(&mut self) {
        self.guard.unlock();
    }
}
