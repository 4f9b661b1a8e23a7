//! Timer interface trait
//!
//! Free-running time source and blocking delays for task context. The DCC
//! waveform timers are not behind this trait; their update interrupts drive
//! the engine and capture state machines directly.

use crate::platform::Result;

/// Timer interface trait
pub trait TimerInterface {
    /// Block for `us` microseconds.
    fn delay_us(&mut self, us: u32) -> Result<()>;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) -> Result<()> {
        self.delay_us(ms.saturating_mul(1000))
    }

    /// Microseconds since boot.
    fn now_us(&self) -> u64;

    /// Milliseconds since boot.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}
