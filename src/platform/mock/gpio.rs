//! Mock GPIO implementations for testing

use crate::platform::{
    error::{GpioError, PlatformError},
    traits::{
        gpio::{IO_BANK_FIRST_PIN, IO_BANK_LAST_PIN},
        GpioBankInterface, GpioInterface, GpioMode,
    },
    Result,
};

/// Mock single-pin GPIO
///
/// Tracks pin state (high/low) and mode for test verification.
#[derive(Debug)]
pub struct MockGpio {
    state: bool,
    mode: GpioMode,
}

impl MockGpio {
    /// Create a new mock GPIO in output mode
    pub fn new_output() -> Self {
        Self {
            state: false,
            mode: GpioMode::OutputPushPull,
        }
    }

    /// Create a new mock GPIO in input mode
    pub fn new_input() -> Self {
        Self {
            state: false,
            mode: GpioMode::Input,
        }
    }

    /// Set the input state (for simulating input pin reads)
    pub fn set_input_state(&mut self, high: bool) {
        self.state = high;
    }
}

impl GpioInterface for MockGpio {
    fn set_high(&mut self) -> Result<()> {
        match self.mode {
            GpioMode::OutputPushPull | GpioMode::OutputOpenDrain => {
                self.state = true;
                Ok(())
            }
            _ => Err(PlatformError::Gpio(GpioError::InvalidMode)),
        }
    }

    fn set_low(&mut self) -> Result<()> {
        match self.mode {
            GpioMode::OutputPushPull | GpioMode::OutputOpenDrain => {
                self.state = false;
                Ok(())
            }
            _ => Err(PlatformError::Gpio(GpioError::InvalidMode)),
        }
    }

    fn read(&self) -> bool {
        self.state
    }

    fn set_mode(&mut self, mode: GpioMode) -> Result<()> {
        self.mode = mode;
        Ok(())
    }

    fn mode(&self) -> GpioMode {
        self.mode
    }
}

const BANK_PINS: usize = IO_BANK_LAST_PIN as usize;

/// Mock sixteen-pin test I/O bank
///
/// All pins start as inputs reading low. Tests inject input levels with
/// [`MockGpioBank::set_input_state`].
#[derive(Debug)]
pub struct MockGpioBank {
    levels: [bool; BANK_PINS],
    is_output: [bool; BANK_PINS],
}

impl MockGpioBank {
    /// Create a new bank, all pins inputs reading low
    pub fn new() -> Self {
        Self {
            levels: [false; BANK_PINS],
            is_output: [false; BANK_PINS],
        }
    }

    fn index(pin: u8) -> Result<usize> {
        if (IO_BANK_FIRST_PIN..=IO_BANK_LAST_PIN).contains(&pin) {
            Ok((pin - IO_BANK_FIRST_PIN) as usize)
        } else {
            Err(GpioError::InvalidPin.into())
        }
    }

    /// Inject an input level (for test setup)
    pub fn set_input_state(&mut self, pin: u8, high: bool) {
        let idx = Self::index(pin).expect("valid pin");
        self.levels[idx] = high;
    }

    /// True if `pin` has been configured as an output (for test verification)
    pub fn is_output(&self, pin: u8) -> bool {
        self.is_output[Self::index(pin).expect("valid pin")]
    }

    /// Current level of `pin` regardless of direction (for test verification)
    pub fn level(&self, pin: u8) -> bool {
        self.levels[Self::index(pin).expect("valid pin")]
    }
}

impl Default for MockGpioBank {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioBankInterface for MockGpioBank {
    fn configure_output(&mut self, pin: u8, initial_high: bool) -> Result<()> {
        let idx = Self::index(pin)?;
        self.is_output[idx] = true;
        self.levels[idx] = initial_high;
        Ok(())
    }

    fn set_output(&mut self, pin: u8, high: bool) -> Result<()> {
        let idx = Self::index(pin)?;
        if !self.is_output[idx] {
            return Err(GpioError::InvalidMode.into());
        }
        self.levels[idx] = high;
        Ok(())
    }

    fn read_input(&self, pin: u8) -> Result<bool> {
        Ok(self.levels[Self::index(pin)?])
    }

    fn read_all(&self) -> u16 {
        self.levels
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, &high)| acc | ((high as u16) << i))
    }
}
