//! Wall-clock source and cancellable timers.
//!
//! Countdown and recording windows are measured against a single injected
//! [`Clock`] so that every timer in a pipeline shares the same notion of "now".

use parking_lot::Mutex;
use std::sync::Arc;

use crate::types::Timestamp;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for deterministic replay and tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, t: Timestamp) {
        *self.now.lock() = t;
    }

    pub fn advance_secs(&self, secs: f64) {
        let mut now = self.now.lock();
        *now = now.add_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// One-shot timer measured against a shared clock
#[derive(Clone)]
pub struct Timer {
    clock: Arc<dyn Clock>,
    started_at: Timestamp,
    duration_secs: f64,
    cancelled: bool,
}

impl Timer {
    /// Start a timer at the clock's current time
    pub fn start(clock: Arc<dyn Clock>, duration_secs: f64) -> Self {
        let started_at = clock.now();
        Self::start_at(clock, started_at, duration_secs)
    }

    /// Start a timer at an explicit instant
    pub fn start_at(clock: Arc<dyn Clock>, started_at: Timestamp, duration_secs: f64) -> Self {
        Self {
            clock,
            started_at,
            duration_secs,
            cancelled: false,
        }
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Seconds since start, never negative
    pub fn elapsed(&self) -> f64 {
        self.clock.now().secs_since(self.started_at).max(0.0)
    }

    pub fn remaining(&self) -> f64 {
        (self.duration_secs - self.elapsed()).max(0.0)
    }

    /// A cancelled timer never expires
    pub fn is_expired(&self) -> bool {
        !self.cancelled && self.elapsed() >= self.duration_secs
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("started_at", &self.started_at)
            .field("duration_secs", &self.duration_secs)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_expires_on_boundary() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(10.0)));
        let timer = Timer::start(clock.clone(), 3.0);

        clock.advance_secs(2.5);
        assert!(!timer.is_expired());
        assert!((timer.remaining() - 0.5).abs() < 1e-6);

        clock.advance_secs(0.5);
        assert!(timer.is_expired());
    }

    #[test]
    fn test_cancelled_timer_never_expires() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs_f64(0.0)));
        let mut timer = Timer::start(clock.clone(), 1.0);
        timer.cancel();
        clock.advance_secs(5.0);
        assert!(timer.is_cancelled());
        assert!(!timer.is_expired());
    }
}
