use crate::reactor::poller::{Notifier, Poller};

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

/// A shared handle to the reactor of the current runtime.
pub type ReactorHandle = Rc<RefCell<Reactor>>;

/// Something that becomes ready outside of the reactor, typically on another
/// thread. The reactor only ever reads the flag; it never blocks on it.
pub(crate) trait Resolved: Send + Sync {
    fn is_resolved(&self) -> bool;
}

struct Watch {
    target: Arc<dyn Resolved>,
    waker: Waker,
}

/// Timers and completion watchers for one runtime.
///
/// Timers fire in deadline order. Completion watchers are scanned on every
/// turn: a watcher whose target has resolved is removed and its waker queued.
/// Nothing here can learn about a completion by itself unless the wake pipe is
/// poked, so while any watcher is registered a blocking wait never lasts
/// longer than `watch_interval`. Per-file keepalive ticks keep the same bound
/// when other timers are far away.
pub struct Reactor {
    poller: Poller,
    watch_interval: Duration,
    timers: BinaryHeap<Reverse<(Instant, u64)>>,
    timer_wakers: HashMap<u64, Waker>,
    watches: HashMap<u64, Watch>,
    next_id: u64,
    ready: Vec<Waker>,
}

impl Reactor {
    pub(crate) fn new(watch_interval: Duration) -> std::io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            watch_interval,
            timers: BinaryHeap::new(),
            timer_wakers: HashMap::new(),
            watches: HashMap::new(),
            next_id: 1,
            ready: Vec::new(),
        })
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub(crate) fn notifier(&self) -> Notifier {
        self.poller.notifier()
    }

    pub(crate) fn register_timer(&mut self, deadline: Instant, waker: Waker) -> u64 {
        let id = self.next_id();
        self.timers.push(Reverse((deadline, id)));
        self.timer_wakers.insert(id, waker);
        id
    }

    /// Replaces the waker of a pending timer. Returns false if it already fired.
    pub(crate) fn update_timer(&mut self, id: u64, waker: &Waker) -> bool {
        match self.timer_wakers.get_mut(&id) {
            Some(current) => {
                if !current.will_wake(waker) {
                    *current = waker.clone();
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_timer(&mut self, id: u64) {
        // The heap entry is skipped lazily when it comes due.
        self.timer_wakers.remove(&id);
    }

    /// Registers (or refreshes, when `id` is given) a completion watcher.
    pub(crate) fn watch_completion(
        &mut self,
        id: Option<u64>,
        target: Arc<dyn Resolved>,
        waker: &Waker,
    ) -> u64 {
        let id = id.unwrap_or_else(|| self.next_id());
        self.watches.insert(
            id,
            Watch {
                target,
                waker: waker.clone(),
            },
        );
        id
    }

    pub(crate) fn unwatch(&mut self, id: u64) {
        self.watches.remove(&id);
    }

    pub(crate) fn pending_completions(&self) -> usize {
        self.watches.len()
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timer_wakers.len()
    }

    /// Turns the reactor without blocking.
    pub(crate) fn poll_events(&mut self) {
        if let Err(err) = self.poller.wait(Some(Duration::ZERO)) {
            warn!(%err, "reactor poll failed");
        }
        self.handle_events();
    }

    /// Blocks until the nearest timer deadline or a wake-pipe notification,
    /// then handles whatever became ready.
    pub(crate) fn wait_for_event(&mut self) {
        let timeout = self.next_timeout();
        trace!(
            ?timeout,
            timers = self.pending_timers(),
            completions = self.pending_completions(),
            "reactor waiting"
        );

        if let Err(err) = self.poller.wait(timeout) {
            warn!(%err, "reactor wait failed");
        }
        self.handle_events();
    }

    fn next_timeout(&mut self) -> Option<Duration> {
        let mut timeout = None;
        while let Some(Reverse((deadline, id))) = self.timers.peek().copied() {
            if self.timer_wakers.contains_key(&id) {
                timeout = Some(deadline.saturating_duration_since(Instant::now()));
                break;
            }
            self.timers.pop();
        }

        if self.watches.is_empty() {
            return timeout;
        }
        Some(timeout.map_or(self.watch_interval, |t| t.min(self.watch_interval)))
    }

    pub(crate) fn handle_events(&mut self) {
        let now = Instant::now();

        while let Some(Reverse((deadline, id))) = self.timers.peek().copied() {
            if deadline > now {
                break;
            }
            self.timers.pop();
            if let Some(waker) = self.timer_wakers.remove(&id) {
                self.ready.push(waker);
            }
        }

        let ready = &mut self.ready;
        self.watches.retain(|_, watch| {
            if watch.target.is_resolved() {
                ready.push(watch.waker.clone());
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn take_ready(&mut self) -> Vec<Waker> {
        std::mem::take(&mut self.ready)
    }

    /// Drops every registration and returns the wakers so the caller can
    /// release them outside of the reactor borrow.
    pub(crate) fn shutdown(&mut self) -> Vec<Waker> {
        self.timers.clear();
        let mut wakers: Vec<Waker> = self.timer_wakers.drain().map(|(_, w)| w).collect();
        wakers.extend(self.watches.drain().map(|(_, w)| w.waker));
        wakers.append(&mut self.ready);
        wakers
    }
}

/// Wakes everything the last reactor turn found ready.
///
/// The wakers are taken out first so that woken tasks and dropped futures are
/// free to borrow the reactor again.
pub(crate) fn wake_ready(reactor: &ReactorHandle) {
    let ready = reactor.borrow_mut().take_ready();
    for waker in ready {
        waker.wake();
    }
}
