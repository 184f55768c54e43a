// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

use rand::Rng;

const MAX_JITTER: Duration = Duration::from_secs(1);

/// Exponential reconnection interval.
///
/// Starts at the configured interval and doubles on each failure, up to the
/// configured maximum. A zero maximum disables the exponential growth and the
/// interval stays constant. Each returned wait is jittered so that a herd of
/// reconnecting endpoints does not hammer a reborn peer in lockstep.
pub struct Backoff {
    ivl: Duration,
    max: Duration,
    current: Option<Duration>
}

impl Backoff {
    pub fn new(ivl: Duration, max: Duration) -> Backoff {
        Backoff {
            ivl,
            max,
            current: None
        }
    }

    /// The next wait before retrying, advancing the interval.
    pub fn next(&mut self) -> Duration {
        let base = self.current.unwrap_or(self.ivl);

        self.current = if self.max > self.ivl {
            Some(std::cmp::min(base * 2, self.max))
        } else {
            Some(base)
        };

        base + jitter(base)
    }

    /// Called once a connection is successfully established.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

fn jitter(base: Duration) -> Duration {
    let bound = std::cmp::min(base / 2, MAX_JITTER);

    if bound.is_zero() {
        Duration::from_millis(0)
    } else {
        rand::thread_rng().gen_range(Duration::from_millis(0)..=bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_doubles_up_to_the_maximum() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));

        assert!(backoff.next() >= Duration::from_millis(100));
        assert!(backoff.next() >= Duration::from_millis(200));
        assert!(backoff.next() >= Duration::from_millis(350));
        assert!(backoff.next() >= Duration::from_millis(350));
    }

    #[test]
    fn zero_maximum_keeps_the_interval_constant() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(0));

        for _ in 0..4 {
            let wait = backoff.next();
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis(150));
        }
    }

    #[test]
    fn reset_starts_the_sequence_over() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(10));

        backoff.next();
        backoff.next();
        backoff.reset();

        let wait = backoff.next();
        assert!(wait >= Duration::from_millis(100));
        assert!(wait <= Duration::from_millis(150));
    }
}
