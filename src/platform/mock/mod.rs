//! Mock platform implementation for testing
//!
//! This module provides mock implementations of the platform traits that can
//! be used for unit and integration testing without hardware.
//!
//! Available during test builds (`#[cfg(test)]`) and when the `mock` feature
//! is enabled (it is part of the default feature set so the host integration
//! tests can link against it).

#![cfg(any(test, feature = "mock"))]

mod adc;
mod board;
mod dac;
mod flash;
mod gpio;
mod rtc;
mod timer;
mod track;
mod uart;

pub use adc::MockAdc;
pub use board::MockBoard;
pub use dac::MockDac;
pub use flash::MockFlash;
pub use gpio::{MockGpio, MockGpioBank};
pub use rtc::MockRtc;
pub use timer::MockTimer;
pub use track::{MockTrackOutputs, TrackEvent};
pub use uart::MockUart;
