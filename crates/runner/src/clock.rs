use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Time source for the poll loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
    /// Wall clock seconds since the Unix epoch, used for run names.
    fn unix_seconds(&self) -> i64;
}

/// Real time. Sleeping blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn unix_seconds(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only advances when slept on. Sleeping returns immediately.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    epoch: i64,
    offset: Cell<Duration>,
    sleeps: Cell<u32>,
}

impl ManualClock {
    pub fn new(epoch: i64) -> Self {
        Self {
            origin: Instant::now(),
            epoch,
            offset: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Total time slept or advanced so far.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn sleep_count(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }

    fn unix_seconds(&self) -> i64 {
        self.epoch + self.offset.get().as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(100);
        let start = clock.now();
        clock.sleep(Duration::from_secs(30));
        clock.sleep(Duration::from_secs(45));
        assert_eq!(clock.now() - start, Duration::from_secs(75));
        assert_eq!(clock.unix_seconds(), 175);
        assert_eq!(clock.sleep_count(), 2);
    }
}
