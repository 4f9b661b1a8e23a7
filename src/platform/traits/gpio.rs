//! GPIO interface traits
//!
//! Defines the single-pin GPIO interface and the numbered I/O bank exposed to
//! the RPC surface.

use crate::platform::Result;

/// GPIO pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioMode {
    /// Input mode (high impedance)
    Input,
    /// Input mode with pull-up resistor
    InputPullUp,
    /// Input mode with pull-down resistor
    InputPullDown,
    /// Output mode (push-pull)
    OutputPushPull,
    /// Output mode (open-drain)
    OutputOpenDrain,
}

/// Single-pin GPIO interface
///
/// # Safety Invariants
///
/// - Only one owner per GPIO pin instance
/// - No concurrent access to the same pin from multiple contexts
pub trait GpioInterface {
    /// Set pin high (logic level 1). Only valid in output modes.
    fn set_high(&mut self) -> Result<()>;

    /// Set pin low (logic level 0). Only valid in output modes.
    fn set_low(&mut self) -> Result<()>;

    /// Read pin state. Valid in both input and output modes.
    fn read(&self) -> bool;

    /// Set pin mode.
    fn set_mode(&mut self, mode: GpioMode) -> Result<()>;

    /// Get current pin mode.
    fn mode(&self) -> GpioMode;
}

/// Lowest valid pin number on the test I/O bank.
pub const IO_BANK_FIRST_PIN: u8 = 1;
/// Highest valid pin number on the test I/O bank.
pub const IO_BANK_LAST_PIN: u8 = 16;

/// Numbered test I/O bank (IO1..IO16)
///
/// The test fixture exposes sixteen general-purpose pins that scripts use to
/// wire the DUT's function outputs back into the station. Pins are addressed
/// 1-based, matching the silkscreen and the RPC contract.
pub trait GpioBankInterface {
    /// Configure `pin` as a push-pull output with an initial level.
    fn configure_output(&mut self, pin: u8, initial_high: bool) -> Result<()>;

    /// Drive an output pin. The pin must have been configured as an output.
    fn set_output(&mut self, pin: u8, high: bool) -> Result<()>;

    /// Read the input level of `pin`.
    fn read_input(&self, pin: u8) -> Result<bool>;

    /// Read all sixteen pins as a packed bitfield (IO1 = bit 0).
    fn read_all(&self) -> u16;
}
