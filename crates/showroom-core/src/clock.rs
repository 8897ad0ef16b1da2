//! Animation clock abstraction

use std::cell::Cell;

/// Monotonic elapsed-time source sampled by the frame driver and animators
pub trait Clock {
    /// Seconds since the clock started. Never decreases.
    fn elapsed_secs(&self) -> f32;
}

/// Clock advanced by hand, used to drive the loop deterministically
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f32>,
}

impl ManualClock {
    pub fn new(start: f32) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, secs: f32) {
        // Time only moves forward
        if secs > self.now.get() {
            self.now.set(secs);
        }
    }

    pub fn advance(&self, secs: f32) {
        self.set(self.now.get() + secs.max(0.0));
    }
}

impl Clock for ManualClock {
    fn elapsed_secs(&self) -> f32 {
        self.now.get()
    }
}

/// Fixed reading, handy for bridging an engine's per-frame time snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenClock(pub f32);

impl Clock for FrozenClock {
    fn elapsed_secs(&self) -> f32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new(1.0);
        clock.advance(0.5);
        assert_eq!(clock.elapsed_secs(), 1.5);
        clock.set(0.2);
        assert_eq!(clock.elapsed_secs(), 1.5);
        clock.advance(-3.0);
        assert_eq!(clock.elapsed_secs(), 1.5);
    }
}
