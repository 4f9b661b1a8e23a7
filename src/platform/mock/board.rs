//! Mock board definition for host testing

use super::{MockAdc, MockDac, MockFlash, MockGpio, MockGpioBank, MockRtc, MockTimer, MockUart};
use crate::platform::traits::Board;

/// Mock board binding every peripheral slot to its in-memory mock.
///
/// `system_reset` records the request instead of resetting, so tests can
/// assert that the reboot RPC only fires after its response was sent.
#[derive(Debug, Default)]
pub struct MockBoard {
    resets: u32,
}

impl MockBoard {
    /// Create a new mock board
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reset requests seen (for test verification)
    pub fn reset_count(&self) -> u32 {
        self.resets
    }
}

impl Board for MockBoard {
    type Flash = MockFlash;
    type Adc = MockAdc;
    type Timer = MockTimer;
    type Dac = MockDac;
    type GpioBank = MockGpioBank;
    type Rtc = MockRtc;
    type BidiUart = MockUart;
    type QuietSense = MockGpio;

    fn system_reset(&mut self) {
        self.resets += 1;
    }
}
