//! pacing.rs
//! Periodic release schedule shared by the simulated radio, the replay radio and
//! the image-directory camera.
//! - SpinSleeper keeps release jitter low on a loaded Raspberry Pi
//! - waits are capped by the caller's timeout so shutdown is observed promptly

use spin_sleep::{SpinSleeper, SpinStrategy};
use std::time::{Duration, Instant};

pub struct Pacer {
    period: Duration,
    next_release: Instant,
    sleeper: SpinSleeper,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_release: Instant::now() + period,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the next release or until `timeout` has elapsed, whichever is
    /// first. Returns true when the release point was reached.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let now = Instant::now();
        if now >= self.next_release {
            self.advance(now);
            return true;
        }

        let remaining = self.next_release - now;
        if remaining > timeout {
            self.sleeper.sleep(timeout);
            return false;
        }

        self.sleeper.sleep(remaining);
        self.advance(Instant::now());
        true
    }

    // Missed releases are skipped, not replayed as a burst.
    fn advance(&mut self, now: Instant) {
        self.next_release += self.period;
        if self.next_release < now {
            self.next_release = now + self.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_timeout_returns_before_release() {
        let mut pacer = Pacer::new(Duration::from_millis(200));
        let start = Instant::now();
        assert!(!pacer.wait(Duration::from_millis(10)));
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn long_timeout_reaches_release() {
        let mut pacer = Pacer::new(Duration::from_millis(5));
        assert!(pacer.wait(Duration::from_millis(100)));
        assert!(pacer.wait(Duration::from_millis(100)));
    }
}
