//! Mock ADC implementation for testing

use crate::platform::{
    error::AdcError,
    traits::{AdcChannel, AdcInterface},
    Result,
};

/// Mock ADC with programmable per-channel readings.
///
/// A small amount of deterministic jitter can be enabled so averaging tests
/// exercise more than one sample value.
#[derive(Debug)]
pub struct MockAdc {
    voltage_raw: u16,
    current_raw: u16,
    jitter: u16,
    conversions: u32,
    fail_next: bool,
}

impl MockAdc {
    /// Create a new mock ADC reading zero on both channels
    pub fn new() -> Self {
        Self {
            voltage_raw: 0,
            current_raw: 0,
            jitter: 0,
            conversions: 0,
            fail_next: false,
        }
    }

    /// Program the raw reading for a channel
    pub fn set_reading(&mut self, channel: AdcChannel, raw: u16) {
        match channel {
            AdcChannel::TrackVoltage => self.voltage_raw = raw,
            AdcChannel::TrackCurrent => self.current_raw = raw,
        }
    }

    /// Alternate readings by +/- `jitter` counts on successive conversions
    pub fn set_jitter(&mut self, jitter: u16) {
        self.jitter = jitter;
    }

    /// Make the next conversion fail
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Total conversions performed (for test verification)
    pub fn conversions(&self) -> u32 {
        self.conversions
    }
}

impl Default for MockAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcInterface for MockAdc {
    fn read(&mut self, channel: AdcChannel) -> Result<u16> {
        if self.fail_next {
            self.fail_next = false;
            return Err(AdcError::ConversionFailed.into());
        }
        self.conversions += 1;
        let base = match channel {
            AdcChannel::TrackVoltage => self.voltage_raw,
            AdcChannel::TrackCurrent => self.current_raw,
        };
        let value = if self.jitter != 0 && self.conversions % 2 == 0 {
            base.saturating_add(self.jitter)
        } else {
            base.saturating_sub(if self.jitter != 0 { self.jitter } else { 0 })
        };
        Ok(value.min(4095))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmed_readings() {
        let mut adc = MockAdc::new();
        adc.set_reading(AdcChannel::TrackVoltage, 1364);
        adc.set_reading(AdcChannel::TrackCurrent, 1000);
        assert_eq!(adc.read(AdcChannel::TrackVoltage).unwrap(), 1364);
        assert_eq!(adc.read(AdcChannel::TrackCurrent).unwrap(), 1000);
        assert_eq!(adc.conversions(), 2);
    }

    #[test]
    fn injected_failure() {
        let mut adc = MockAdc::new();
        adc.fail_next();
        assert!(adc.read(AdcChannel::TrackVoltage).is_err());
        assert!(adc.read(AdcChannel::TrackVoltage).is_ok());
    }
}
