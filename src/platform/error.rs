//! Platform error types
//!
//! This module defines error types for platform operations.

use core::fmt;

/// Result type for platform operations
pub type Result<T> = core::result::Result<T, PlatformError>;

/// Platform-level errors
///
/// All platform implementations map their HAL-specific errors to these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// Flash operation failed
    Flash(FlashError),
    /// GPIO operation failed
    Gpio(GpioError),
    /// ADC operation failed
    Adc(AdcError),
    /// DAC operation failed
    Dac(DacError),
    /// RTC operation failed
    Rtc(RtcError),
    /// UART operation failed
    Uart(UartError),
    /// Timer operation failed
    Timer(TimerError),
    /// Invalid configuration provided
    InvalidConfig,
    /// Resource not available
    ResourceUnavailable,
}

/// Flash-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Address outside the device or not writable
    InvalidAddress,
    /// Address or size not aligned to the sector size
    NotAligned,
    /// Sector erase failed
    EraseFailed,
    /// Program operation failed
    WriteFailed,
    /// Read operation failed
    ReadFailed,
}

/// GPIO-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    /// Invalid pin number
    InvalidPin,
    /// Invalid mode for operation
    InvalidMode,
}

/// ADC-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    /// The converter is serialized by a mutex; acquisition timed out
    Busy,
    /// Conversion did not complete
    ConversionFailed,
    /// Channel not allocated on this board
    InvalidChannel,
}

/// DAC-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacError {
    /// Value exceeds the 12-bit range
    InvalidValue,
    /// Channel written before being started
    NotStarted,
}

/// RTC-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// Date or time field out of range
    InvalidDateTime,
}

/// UART-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartError {
    /// Write operation failed
    WriteFailed,
    /// Read operation failed
    ReadFailed,
    /// RX overrun
    Overrun,
}

/// Timer-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Invalid duration
    InvalidDuration,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Flash(e) => write!(f, "flash error: {:?}", e),
            PlatformError::Gpio(e) => write!(f, "GPIO error: {:?}", e),
            PlatformError::Adc(e) => write!(f, "ADC error: {:?}", e),
            PlatformError::Dac(e) => write!(f, "DAC error: {:?}", e),
            PlatformError::Rtc(e) => write!(f, "RTC error: {:?}", e),
            PlatformError::Uart(e) => write!(f, "UART error: {:?}", e),
            PlatformError::Timer(e) => write!(f, "timer error: {:?}", e),
            PlatformError::InvalidConfig => write!(f, "invalid configuration"),
            PlatformError::ResourceUnavailable => write!(f, "resource not available"),
        }
    }
}

impl From<FlashError> for PlatformError {
    fn from(err: FlashError) -> Self {
        PlatformError::Flash(err)
    }
}

impl From<GpioError> for PlatformError {
    fn from(err: GpioError) -> Self {
        PlatformError::Gpio(err)
    }
}

impl From<AdcError> for PlatformError {
    fn from(err: AdcError) -> Self {
        PlatformError::Adc(err)
    }
}

impl From<DacError> for PlatformError {
    fn from(err: DacError) -> Self {
        PlatformError::Dac(err)
    }
}

impl From<RtcError> for PlatformError {
    fn from(err: RtcError) -> Self {
        PlatformError::Rtc(err)
    }
}

impl From<UartError> for PlatformError {
    fn from(err: UartError) -> Self {
        PlatformError::Uart(err)
    }
}

impl From<TimerError> for PlatformError {
    fn from(err: TimerError) -> Self {
        PlatformError::Timer(err)
    }
}
