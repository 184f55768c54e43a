// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::Task;

/// Handle on a scheduled timer, returned by `TimerSet::schedule` and accepted
/// by `TimerSet::cancel`. Ordering is by deadline first and insertion order
/// second, so ties fire in the order they were set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Scheduled {
    at: Instant,
    seq: u64
}

/// Deadline-ordered timer collection of one worker.
/// All operations happen on the worker thread, so cancellation is exact:
/// a cancelled timer never fires.
pub struct TimerSet {
    entries: BTreeMap<Scheduled, Task>,
    seq: u64
}

impl TimerSet {
    pub fn new() -> TimerSet {
        TimerSet {
            entries: BTreeMap::new(),
            seq: 0
        }
    }

    pub fn schedule(&mut self, delay: Duration, task: Task) -> Scheduled {
        let handle = Scheduled {
            at: Instant::now() + delay,
            seq: self.seq
        };

        self.seq += 1;
        self.entries.insert(handle, task);
        handle
    }

    pub fn cancel(&mut self, handle: &Scheduled) -> bool {
        self.entries.remove(handle).is_some()
    }

    /// Sleep bound for the poller: time until the earliest deadline,
    /// or `None` when no timer is set.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.entries.keys().next().map(|s| s.at.saturating_duration_since(now))
    }

    /// Removes and returns the next expired task, if any.
    pub fn pop_expired(&mut self, now: Instant) -> Option<Task> {
        let expired = match self.entries.keys().next() {
            Some(s) if s.at <= now => *s,
            _ => return None
        };

        self.entries.remove(&expired)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::SocketId;

    #[test]
    fn timers_fire_in_deadline_order_with_insertion_ties() {
        let mut timers = TimerSet::new();
        let now = Instant::now();

        timers.schedule(Duration::from_millis(10), Task::CancelSend(SocketId(1)));
        timers.schedule(Duration::from_millis(10), Task::CancelSend(SocketId(2)));
        timers.schedule(Duration::from_millis(5), Task::CancelSend(SocketId(3)));

        let later = now + Duration::from_millis(20);
        let order: Vec<_> = std::iter::from_fn(|| timers.pop_expired(later))
            .map(|t| match t {
                Task::CancelSend(sid) => sid.0,
                _ => unreachable!()
            })
            .collect();

        assert_eq!(vec![3, 1, 2], order);
    }

    #[test]
    fn cancelled_timers_do_not_fire() {
        let mut timers = TimerSet::new();

        let handle = timers.schedule(Duration::from_millis(0), Task::CancelRecv(SocketId(1)));

        assert!(timers.cancel(&handle));
        assert!(!timers.cancel(&handle));
        assert!(timers.is_empty());
        assert!(timers.pop_expired(Instant::now() + Duration::from_millis(1)).is_none());
    }

    #[test]
    fn next_timeout_tracks_the_earliest_deadline() {
        let mut timers = TimerSet::new();
        let now = Instant::now();

        assert_eq!(None, timers.next_timeout(now));

        timers.schedule(Duration::from_millis(50), Task::CancelSend(SocketId(1)));

        let bound = timers.next_timeout(now).unwrap();
        assert!(bound <= Duration::from_millis(50));
    }
}
