//! DCC command station
//!
//! Split across the task/ISR boundary: [`controller::CsController`] runs in
//! task context and owns policy (life-cycle, test loops, the custom-packet
//! slot, DAC programming); [`engine::TimingEngine`] runs in the timer-update
//! interrupt and owns the waveform. The two halves communicate exclusively
//! through [`CsShared`] (release/acquire atomics) and an spsc packet queue,
//! so the interrupt side never blocks.

pub mod controller;
pub mod engine;

pub use controller::{CsController, CsError, LoopMode};
pub use engine::TimingEngine;

use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::dcc;

bitflags! {
    /// Boolean switches carried inside the packed config word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags: u8 {
        /// Emit a BiDi cutout after every packet
        const BIDI = 1 << 0;
        /// Pulse the scope pin on the first bit of every packet
        const TRIGGER_FIRST_BIT = 1 << 1;
    }
}

/// Timing configuration the engine applies per packet.
///
/// Durations deliberately out of NMRA tolerance are emitted verbatim; that is
/// the mechanism DUT margin tests rely on. Only structural invariants are
/// checked at activation (see [`TimingConfig::validate`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Preamble one-bits per packet, at least 14
    pub num_preamble: u8,
    /// Logical 1 half-period in microseconds
    pub bit1_duration_us: u8,
    /// Logical 0 half-period in microseconds
    pub bit0_duration_us: u8,
    /// Emit the BiDi cutout after each packet
    pub bidi_enable: bool,
    /// Pulse the scope pin on each packet's first bit
    pub trigger_first_bit: bool,
    /// BiDi receive comparator threshold (12-bit DAC value)
    pub bidi_dac: u16,
}

/// Reasons a [`TimingConfig`] is rejected at activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Fewer than 14 preamble bits
    PreambleTooShort,
    /// A zero bit duration would stall the waveform timer
    ZeroBitDuration,
    /// DAC threshold beyond 12 bits
    DacOutOfRange,
}

impl TimingConfig {
    /// NMRA-nominal configuration, matching the factory defaults.
    pub const fn nominal() -> Self {
        Self {
            num_preamble: 17,
            bit1_duration_us: dcc::BIT1_NOMINAL_US,
            bit0_duration_us: dcc::BIT0_NOMINAL_US,
            bidi_enable: false,
            trigger_first_bit: false,
            bidi_dac: 2048,
        }
    }

    /// Structural validation performed when the command station starts.
    /// Rejected configurations never reach the interrupt handler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_preamble < dcc::TX_PREAMBLE_MIN_BITS {
            return Err(ConfigError::PreambleTooShort);
        }
        if self.bit1_duration_us == 0 || self.bit0_duration_us == 0 {
            return Err(ConfigError::ZeroBitDuration);
        }
        if self.bidi_dac > 4095 {
            return Err(ConfigError::DacOutOfRange);
        }
        Ok(())
    }

    fn flags(&self) -> ConfigFlags {
        let mut flags = ConfigFlags::empty();
        flags.set(ConfigFlags::BIDI, self.bidi_enable);
        flags.set(ConfigFlags::TRIGGER_FIRST_BIT, self.trigger_first_bit);
        flags
    }

    /// Pack into one word for the lock-free config mailbox.
    pub fn to_bits(self) -> u64 {
        (self.num_preamble as u64)
            | (self.bit1_duration_us as u64) << 8
            | (self.bit0_duration_us as u64) << 16
            | (self.flags().bits() as u64) << 24
            | (self.bidi_dac as u64) << 32
    }

    /// Unpack from the config mailbox word.
    pub fn from_bits(bits: u64) -> Self {
        let flags = ConfigFlags::from_bits_truncate((bits >> 24) as u8);
        Self {
            num_preamble: bits as u8,
            bit1_duration_us: (bits >> 8) as u8,
            bit0_duration_us: (bits >> 16) as u8,
            bidi_enable: flags.contains(ConfigFlags::BIDI),
            trigger_first_bit: flags.contains(ConfigFlags::TRIGGER_FIRST_BIT),
            bidi_dac: (bits >> 32) as u16 & 0x0FFF,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::nominal()
    }
}

/// Per-bit timing override used for DUT margin tests.
///
/// When bit `k` of `mask` is set and the engine is emitting the `k`-th bit of
/// a packet (counted from the packet start bit) and that bit is a logical 0,
/// the programmed half-period is adjusted by `delta_p` on the positive drive
/// phase and `delta_n` on the negative one. RAM-only; cleared whenever the
/// command station stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrideMap {
    /// Packet-bit selection mask, bit 0 = packet start bit
    pub mask: u64,
    /// Adjustment in microseconds for the positive half
    pub delta_p: i32,
    /// Adjustment in microseconds for the negative half
    pub delta_n: i32,
}

impl OverrideMap {
    /// True when any bit is selected.
    pub fn is_active(&self) -> bool {
        self.mask != 0
    }

    /// True when packet bit `index` is selected.
    pub fn selects(&self, index: u32) -> bool {
        index < 64 && (self.mask >> index) & 1 == 1
    }
}

/// Lock-free state shared between the CS controller (task context) and the
/// timing engine (interrupt context).
///
/// The controller is the only writer of the request flags and the config
/// mailbox; the engine is the only writer of `running` and the counters.
/// Orderings are release on the writer side, acquire on the reader side, so
/// a flag observed set implies the payload written before it is visible.
#[derive(Debug)]
pub struct CsShared {
    start_request: AtomicBool,
    stop_request: AtomicBool,
    running: AtomicBool,
    config: AtomicU64,
    override_mask: AtomicU64,
    override_delta_p: AtomicI32,
    override_delta_n: AtomicI32,
    packets_sent: AtomicU32,
}

impl CsShared {
    /// Create shared state in the fresh-boot configuration.
    pub const fn new() -> Self {
        Self {
            start_request: AtomicBool::new(false),
            stop_request: AtomicBool::new(false),
            running: AtomicBool::new(false),
            config: AtomicU64::new(0),
            override_mask: AtomicU64::new(0),
            override_delta_p: AtomicI32::new(0),
            override_delta_n: AtomicI32::new(0),
            packets_sent: AtomicU32::new(0),
        }
    }

    /// Publish a configuration and ask the engine to start.
    pub fn request_start(&self, cfg: TimingConfig) {
        self.stop_request.store(false, Ordering::Release);
        self.config.store(cfg.to_bits(), Ordering::Release);
        self.packets_sent.store(0, Ordering::Release);
        self.start_request.store(true, Ordering::Release);
    }

    /// Withdraw a start the engine has not consumed yet. Returns true if the
    /// request was still pending.
    pub fn cancel_start(&self) -> bool {
        self.start_request.swap(false, Ordering::AcqRel)
    }

    /// Publish a new configuration; the engine re-reads it at the next
    /// inter-packet boundary.
    pub fn publish_config(&self, cfg: TimingConfig) {
        self.config.store(cfg.to_bits(), Ordering::Release);
    }

    /// Ask the engine to wind down after the current packet.
    pub fn request_stop(&self) {
        self.stop_request.store(true, Ordering::Release);
    }

    /// True while the engine is emitting.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Install an override map; visible to the engine at the next bit.
    pub fn set_override(&self, map: OverrideMap) {
        self.override_delta_p.store(map.delta_p, Ordering::Relaxed);
        self.override_delta_n.store(map.delta_n, Ordering::Relaxed);
        self.override_mask.store(map.mask, Ordering::Release);
    }

    /// Clear the override map.
    pub fn clear_override(&self) {
        self.set_override(OverrideMap::default());
    }

    /// Current override map.
    pub fn override_map(&self) -> OverrideMap {
        let mask = self.override_mask.load(Ordering::Acquire);
        OverrideMap {
            mask,
            delta_p: self.override_delta_p.load(Ordering::Relaxed),
            delta_n: self.override_delta_n.load(Ordering::Relaxed),
        }
    }

    /// Packets completed since the last start.
    pub fn packets_sent(&self) -> u32 {
        self.packets_sent.load(Ordering::Acquire)
    }

    pub(crate) fn take_start_request(&self) -> bool {
        self.start_request.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_stop_request(&self) -> bool {
        self.stop_request.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn config_bits(&self) -> u64 {
        self.config.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn count_packet(&self) {
        self.packets_sent.fetch_add(1, Ordering::Release);
    }
}

impl Default for CsShared {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_pack_roundtrip() {
        let cfg = TimingConfig {
            num_preamble: 20,
            bit1_duration_us: 61,
            bit0_duration_us: 116,
            bidi_enable: true,
            trigger_first_bit: true,
            bidi_dac: 0x0ABC,
        };
        assert_eq!(TimingConfig::from_bits(cfg.to_bits()), cfg);
    }

    #[test]
    fn nominal_config_is_valid() {
        assert!(TimingConfig::nominal().validate().is_ok());
    }

    #[test]
    fn short_preamble_rejected() {
        let cfg = TimingConfig {
            num_preamble: 13,
            ..TimingConfig::nominal()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::PreambleTooShort));
    }

    #[test]
    fn out_of_tolerance_durations_accepted() {
        // Deliberately violating NMRA limits is the point of the test station.
        let cfg = TimingConfig {
            bit1_duration_us: 40,
            bit0_duration_us: 70,
            ..TimingConfig::nominal()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn override_selection() {
        let map = OverrideMap {
            mask: 1 << 4,
            delta_p: 10,
            delta_n: -10,
        };
        assert!(map.selects(4));
        assert!(!map.selects(3));
        assert!(!map.selects(5));
        assert!(!map.selects(64));
    }

    #[test]
    fn start_request_handshake() {
        let shared = CsShared::new();
        shared.request_start(TimingConfig::nominal());
        assert!(shared.take_start_request());
        assert!(!shared.take_start_request());
        assert_eq!(
            TimingConfig::from_bits(shared.config_bits()),
            TimingConfig::nominal()
        );
    }
}
