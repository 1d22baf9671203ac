#![forbid(unsafe_code)]

//! Deferred work, driven by an explicit tick.
//!
//! Three lanes, drained in this order by the owner's tick:
//!
//! - **microtasks**: run as soon as the current operation returns.
//! - **next frame**: run once per tick, after microtasks. Duplicate
//!   requests for the same task collapse into one.
//! - **delayed**: run once `now` reaches their deadline; ties keep
//!   scheduling order.
//!
//! Tasks are plain values; the owner decides what each one does. Nothing
//! here reads a clock, so tests pass explicit instants.

use std::collections::VecDeque;
use std::time::Duration;

use web_time::Instant;

/// Queue lanes for tasks of type `T`.
#[derive(Debug, Clone)]
pub struct TaskQueue<T> {
    microtasks: VecDeque<T>,
    next_frame: Vec<T>,
    delayed: Vec<Delayed<T>>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Delayed<T> {
    at: Instant,
    seq: u64,
    task: T,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            microtasks: VecDeque::new(),
            next_frame: Vec::new(),
            delayed: Vec::new(),
            seq: 0,
        }
    }
}

impl<T> TaskQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_microtask(&mut self, task: T) {
        self.microtasks.push_back(task);
    }

    /// Pop the oldest microtask.
    pub fn take_microtask(&mut self) -> Option<T> {
        self.microtasks.pop_front()
    }

    /// Run `task` at or after `at`.
    pub fn schedule_at(&mut self, at: Instant, task: T) {
        self.seq += 1;
        self.delayed.push(Delayed {
            at,
            seq: self.seq,
            task,
        });
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, task: T) {
        self.schedule_at(now + delay, task);
    }

    /// Remove and return the frame lane.
    pub fn take_frame(&mut self) -> Vec<T> {
        std::mem::take(&mut self.next_frame)
    }

    /// Remove and return delayed tasks due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.delayed).into_iter().partition(|d| d.at <= now);
        self.delayed = pending;
        due.sort_by_key(|d| (d.at, d.seq));
        due.into_iter().map(|d| d.task).collect()
    }

    /// Drop queued tasks in every lane for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.microtasks.retain(|task| keep(task));
        self.next_frame.retain(|task| keep(task));
        self.delayed.retain(|d| keep(&d.task));
    }

    /// Earliest delayed deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.delayed.iter().map(|d| d.at).min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.microtasks.len() + self.next_frame.len() + self.delayed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.microtasks.clear();
        self.next_frame.clear();
        self.delayed.clear();
    }
}

impl<T: PartialEq> TaskQueue<T> {
    /// Queue `task` for the next frame unless an equal task is already
    /// queued. Returns `false` when collapsed.
    pub fn request_frame(&mut self, task: T) -> bool {
        if self.next_frame.contains(&task) {
            return false;
        }
        self.next_frame.push(task);
        true
    }

    /// Whether an equal task is waiting in any lane.
    #[must_use]
    pub fn contains(&self, task: &T) -> bool {
        self.microtasks.contains(task)
            || self.next_frame.contains(task)
            || self.delayed.iter().any(|d| &d.task == task)
    }
}
