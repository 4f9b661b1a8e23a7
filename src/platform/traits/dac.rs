//! DAC interface trait

use crate::platform::Result;

/// DAC interface trait
///
/// Drives the BiDi receive comparator threshold. 12-bit right-aligned values.
///
/// # Safety Invariants
///
/// - The channel must be started before the first value is written
/// - Owned by the command station controller; no other writer exists
pub trait DacInterface {
    /// Enable the output channel.
    fn start(&mut self) -> Result<()>;

    /// Disable the output channel.
    fn stop(&mut self) -> Result<()>;

    /// Write a 12-bit value (0..=4095) to the output.
    fn set_value(&mut self, value: u16) -> Result<()>;
}
