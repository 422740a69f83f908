//! Timer System
//!
//! Provides `sleep` for process bodies and tests.
//!
//! Design:
//! - Timers live in a slab, ordered by (deadline, id) in a BTreeSet
//! - Each timer wakes one waker when it expires
//! - The executor fires expired timers every loop and sleeps the thread
//!   until the next deadline when nothing else is ready

use slab::Slab;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Where a timer lives: its slab slot plus the id guarding slot reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerKey {
    slot: usize,
    id: TimerId,
}

#[derive(Debug)]
struct TimerEntry {
    id: TimerId,
    deadline: Instant,
    waker: Waker,
}

/// Pending timers, soonest first
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Slab<TimerEntry>,
    order: BTreeSet<(Instant, TimerId, usize)>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, waker: Waker) -> TimerKey {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let slot = self.entries.insert(TimerEntry {
            id,
            deadline,
            waker,
        });
        self.order.insert((deadline, id, slot));
        TimerKey { slot, id }
    }

    /// Replace the waker of a live timer. Returns false if it already fired.
    pub fn update_waker(&mut self, key: TimerKey, waker: &Waker) -> bool {
        match self.entries.get_mut(key.slot) {
            Some(entry) if entry.id == key.id => {
                if !entry.waker.will_wake(waker) {
                    entry.waker = waker.clone();
                }
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.entries.get(key.slot) {
            Some(entry) if entry.id == key.id => {
                let entry = self.entries.remove(key.slot);
                self.order.remove(&(entry.deadline, entry.id, key.slot));
                true
            }
            _ => false,
        }
    }

    /// Remove every timer due at `now`, returning their wakers
    pub fn expire(&mut self, now: Instant) -> Vec<Waker> {
        let mut wakers = Vec::new();
        while let Some(&(deadline, _, slot)) = self.order.first() {
            if deadline > now {
                break;
            }
            self.order.pop_first();
            wakers.push(self.entries.remove(slot).waker);
        }
        wakers
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.order.first().map(|&(deadline, _, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Suspend the current task for `duration`
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
        key: None,
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    deadline: Instant,
    key: Option<TimerKey>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            if let Some(key) = self.key.take() {
                super::with_timers(|timers| timers.cancel(key));
            }
            return Poll::Ready(());
        }
        let deadline = self.deadline;
        let current = self.key;
        let key = super::with_timers(|timers| match current {
            Some(key) if timers.update_waker(key, cx.waker()) => key,
            _ => timers.schedule(deadline, cx.waker().clone()),
        });
        self.key = Some(key);
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            super::try_with_timers(|timers| {
                timers.cancel(key);
            });
        }
    }
}
