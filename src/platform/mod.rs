//! Platform abstraction layer
//!
//! Every hardware resource the test station touches (flash, timers, GPIO,
//! ADC, DAC, RTC, UART, the track driver stage) is expressed as a trait in
//! [`traits`]; each resource is uniquely owned by the task or interrupt that
//! consumes it and handed over at construction time. [`mock`] provides
//! in-memory implementations for host-side testing.

pub mod error;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{PlatformError, Result};
