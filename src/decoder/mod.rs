//! DCC decoder
//!
//! Mirror image of the command station: [`capture::WaveformCapture`] runs in
//! the timer input-capture interrupt and turns half-period samples into
//! validated packets; [`controller::DecoderController`] runs in task context,
//! interprets the packets against its CV model and fires the capability hooks
//! in [`DecoderCallbacks`]. Decoded packets cross the ISR boundary through an
//! spsc queue; observability counters are plain atomics surfaced on request.

pub mod capture;
pub mod controller;

pub use capture::{BitWindows, WaveformCapture};
pub use controller::{DecoderController, DecoderError, LoggingCallbacks};

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::dcc::bidi::Datagram;

/// Capability hooks the decoder invokes as packets are interpreted.
///
/// Replaces the virtual dispatch of a classic decoder object model: the
/// system installs one implementation at construction time.
/// [`LoggingCallbacks`] is the default, reporting to the logging surface.
pub trait DecoderCallbacks {
    /// Direction changed for `addr`.
    fn on_direction(&mut self, _addr: u16, _forward: bool) {}

    /// Speed step received for `addr` (0 = stop).
    fn on_speed(&mut self, _addr: u16, _step: u8) {}

    /// Function group update; `mask` selects the affected function bits
    /// (F0 = bit 0), `state` carries their new values.
    fn on_function(&mut self, _addr: u16, _mask: u32, _state: u32) {}

    /// CV verified (operations mode). `value` is the table's current content.
    fn on_cv_read(&mut self, _cv: u16, _value: u8) {}

    /// CV written (operations mode).
    fn on_cv_write(&mut self, _cv: u16, _value: u8) {}

    /// BiDi datagram handed to the transmit UART.
    fn on_bidi_tx(&mut self, _datagram: &Datagram) {}
}

/// Lock-free state shared between the capture interrupt and the decoder
/// controller. The interrupt only increments counters and raises
/// `packet_end`; the controller owns everything else.
#[derive(Debug, Default)]
pub struct DecoderShared {
    running: AtomicBool,
    packet_end: AtomicBool,
    packets_decoded: AtomicU32,
    crc_errors: AtomicU32,
    framing_errors: AtomicU32,
    resyncs: AtomicU32,
    queue_overflows: AtomicU32,
}

/// Snapshot of the decoder's observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderCounters {
    /// Packets that passed XOR validation and were delivered
    pub packets_decoded: u32,
    /// Packets dropped on XOR mismatch
    pub crc_errors: u32,
    /// Half-period pairs that failed classification
    pub framing_errors: u32,
    /// Resynchronizations after capture overflow
    pub resyncs: u32,
    /// Packets dropped because the delivery queue was full
    pub queue_overflows: u32,
}

impl DecoderShared {
    /// Create shared state in the fresh-boot configuration.
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            packet_end: AtomicBool::new(false),
            packets_decoded: AtomicU32::new(0),
            crc_errors: AtomicU32::new(0),
            framing_errors: AtomicU32::new(0),
            resyncs: AtomicU32::new(0),
            queue_overflows: AtomicU32::new(0),
        }
    }

    /// True while the decoder is capturing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Counter snapshot for the RPC observability surface.
    pub fn counters(&self) -> DecoderCounters {
        DecoderCounters {
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn raise_packet_end(&self) {
        self.packet_end.store(true, Ordering::Release);
    }

    pub(crate) fn take_packet_end(&self) -> bool {
        self.packet_end.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn count_packet(&self) {
        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }
}
