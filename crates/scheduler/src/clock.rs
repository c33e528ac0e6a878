//! Monotonic time source and the package stall timer.
//!
//! Timers never fire on their own: the scheduler compares each deadline
//! against [`Clock::now`] on every `tick()`, so tests drive time with a
//! [`ManualClock`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source injected into the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock monotonic time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }
}

/// Deadline-based one-shot timer, rearmed by `reset`.
///
/// A running timer whose deadline does not fit in an `Instant` never
/// expires.
#[derive(Debug, Clone)]
pub struct StallTimer {
    timeout: Duration,
    running: bool,
    deadline: Option<Instant>,
}

impl StallTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            running: false,
            deadline: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.deadline = now.checked_add(self.timeout);
    }

    /// Restart the window from `now`. Has no effect on a stopped timer.
    pub fn reset(&mut self, now: Instant) {
        if self.running {
            self.start(now);
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
