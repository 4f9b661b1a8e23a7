//! Mock timer implementation for testing
//!
//! Uses simulated time: delays advance an internal counter instead of
//! blocking, so tests that exercise averaged sampling run instantly.

use crate::platform::{traits::TimerInterface, Result};

/// Mock timer with simulated monotonic time
#[derive(Debug, Default)]
pub struct MockTimer {
    now_us: u64,
}

impl MockTimer {
    /// Create a new mock timer at t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance simulated time without a delay call (for test setup)
    pub fn advance_ms(&mut self, ms: u64) {
        self.now_us += ms * 1000;
    }
}

impl TimerInterface for MockTimer {
    fn delay_us(&mut self, us: u32) -> Result<()> {
        self.now_us = self.now_us.wrapping_add(us as u64);
        Ok(())
    }

    fn now_us(&self) -> u64 {
        self.now_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_advance_time() {
        let mut timer = MockTimer::new();
        timer.delay_us(1000).unwrap();
        assert_eq!(timer.now_us(), 1000);
        timer.delay_ms(5).unwrap();
        assert_eq!(timer.now_ms(), 6);
    }
}
