//! ADC interface trait

use crate::platform::Result;

/// Analog channels allocated on the test station board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcChannel {
    /// Scaled track voltage feedback
    TrackVoltage,
    /// Track current shunt feedback
    TrackCurrent,
}

/// ADC interface trait
///
/// One conversion per call; averaging is the caller's concern (see
/// [`crate::analog::AnalogFeedback`]).
///
/// # Safety Invariants
///
/// - The converter is a shared resource serialized by its owner; callers must
///   not issue overlapping conversions
pub trait AdcInterface {
    /// Perform a single conversion and return the raw 12-bit value (0..=4095).
    fn read(&mut self, channel: AdcChannel) -> Result<u16>;
}
