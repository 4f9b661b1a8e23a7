//! Platform abstraction traits
//!
//! This module defines the traits that platform implementations must provide.

pub mod adc;
pub mod board;
pub mod dac;
pub mod flash;
pub mod gpio;
pub mod rtc;
pub mod timer;
pub mod track;
pub mod uart;

// Re-export trait interfaces
pub use adc::{AdcChannel, AdcInterface};
pub use board::Board;
pub use dac::DacInterface;
pub use flash::FlashInterface;
pub use gpio::{GpioBankInterface, GpioInterface, GpioMode};
pub use rtc::{DateTime, RtcInterface};
pub use timer::TimerInterface;
pub use track::TrackOutputs;
pub use uart::UartInterface;
