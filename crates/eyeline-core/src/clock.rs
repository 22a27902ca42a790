//! Monotonic time sources for contact durations, blink rates and cooldowns.

use std::sync::Mutex;
use std::time::Instant;

/// Seconds since an arbitrary, fixed origin. Never goes backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock implementation backed by [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for replaying recorded streams and for tests.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, secs: f64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += secs.max(0.0);
    }

    pub fn set(&self, secs: f64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if secs > *now {
            *now = secs;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(10.0);
        clock.advance(0.5);
        assert!((clock.now() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_manual_clock_never_rewinds() {
        let clock = ManualClock::new(5.0);
        clock.set(3.0);
        clock.advance(-1.0);
        assert_eq!(clock.now(), 5.0);
    }

    #[test]
    fn test_monotonic_clock_non_decreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
