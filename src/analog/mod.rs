//! Analog feedback
//!
//! On-demand averaged ADC reads for track voltage and current. The converter
//! is a shared resource: acquisition goes through an atomic gate that stands
//! in for the ADC mutex of the task runtime (a contended read reports a
//! hardware fault instead of blocking past its timeout).

use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::error::AdcError;
use crate::platform::traits::{AdcChannel, AdcInterface, TimerInterface};
use crate::platform::{PlatformError, Result};

/// Millivolts per ADC count on the scaled track-voltage divider.
pub const VOLTAGE_SCALE_MV_PER_COUNT: u32 = 11;
/// ADC counts per milliamp on the current shunt (0.5 mA per count).
pub const CURRENT_COUNTS_PER_MA: u32 = 2;

/// Bounds for the averaging request coming from the RPC surface.
pub const MIN_SAMPLES: u8 = 1;
/// Upper bound on samples per request.
pub const MAX_SAMPLES: u8 = 16;
/// Upper bound on the inter-sample delay in milliseconds.
pub const MAX_SAMPLE_DELAY_MS: u16 = 1000;

/// Averaging request: sample count and inter-sample delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Conversions to average, 1..=16
    pub num_samples: u8,
    /// Delay between conversions in milliseconds, 0..=1000
    pub sample_delay_ms: u16,
}

impl SampleSpec {
    /// Single unaveraged conversion.
    pub const fn single() -> Self {
        Self {
            num_samples: 1,
            sample_delay_ms: 0,
        }
    }

    /// Range check against the documented RPC bounds.
    pub fn is_valid(&self) -> bool {
        (MIN_SAMPLES..=MAX_SAMPLES).contains(&self.num_samples)
            && self.sample_delay_ms <= MAX_SAMPLE_DELAY_MS
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self::single()
    }
}

/// Averaged analog feedback over the owned ADC and delay timer.
pub struct AnalogFeedback<A: AdcInterface, T: TimerInterface> {
    adc: A,
    timer: T,
    gate: AtomicBool,
}

impl<A: AdcInterface, T: TimerInterface> AnalogFeedback<A, T> {
    /// Create the feedback unit owning its converter and delay source.
    pub fn new(adc: A, timer: T) -> Self {
        Self {
            adc,
            timer,
            gate: AtomicBool::new(false),
        }
    }

    /// Averaged track voltage in millivolts.
    pub fn read_voltage_mv(&mut self, spec: SampleSpec) -> Result<u16> {
        let raw = self.read_averaged(AdcChannel::TrackVoltage, spec)?;
        Ok((raw * VOLTAGE_SCALE_MV_PER_COUNT).min(u16::MAX as u32) as u16)
    }

    /// Averaged track current in milliamps.
    pub fn read_current_ma(&mut self, spec: SampleSpec) -> Result<u16> {
        let raw = self.read_averaged(AdcChannel::TrackCurrent, spec)?;
        Ok((raw / CURRENT_COUNTS_PER_MA) as u16)
    }

    fn read_averaged(&mut self, channel: AdcChannel, spec: SampleSpec) -> Result<u32> {
        if !spec.is_valid() {
            return Err(PlatformError::InvalidConfig);
        }
        let _guard = GateGuard::acquire(&self.gate)?;

        let mut sum: u32 = 0;
        for i in 0..spec.num_samples {
            if i > 0 && spec.sample_delay_ms > 0 {
                self.timer.delay_ms(spec.sample_delay_ms as u32)?;
            }
            sum += self.adc.read(channel)? as u32;
        }
        Ok(sum / spec.num_samples as u32)
    }

    /// Access the owned ADC (test setup).
    #[cfg(any(test, feature = "mock"))]
    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }

    /// Hold the gate externally (test setup for contention paths).
    #[cfg(any(test, feature = "mock"))]
    pub fn block_gate(&self, held: bool) {
        self.gate.store(held, Ordering::Release);
    }
}

struct GateGuard<'a> {
    gate: &'a AtomicBool,
}

impl<'a> GateGuard<'a> {
    fn acquire(gate: &'a AtomicBool) -> Result<Self> {
        if gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AdcError::Busy.into());
        }
        Ok(Self { gate })
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}
