//! Waveform timing engine
//!
//! Runs in the timer-update interrupt: every call to
//! [`TimingEngine::on_timer_update`] drives the track outputs for the half-bit
//! that starts now and returns the auto-reload value (half-period in
//! microseconds) the glue loads into the timer. Two updates make one logical
//! bit, the second with opposite drive phase.
//!
//! The engine is wait-free: packets arrive through an spsc consumer, control
//! flows through the release/acquire flags in [`CsShared`], and nothing here
//! blocks or allocates. When the queue is empty the engine emits idle packets
//! rather than silence.

use crate::dcc::{self, bidi, Packet, PacketConsumer};
use crate::platform::traits::TrackOutputs;

use super::{CsShared, TimingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    /// Timer stopped, waiting for a start request
    Idle,
    /// Leading one-bits
    Preamble,
    /// Packet start bit or byte separator (logical 0)
    Start,
    /// Data bits of the current octet, MSB first
    Data,
    /// Packet end bit (logical 1)
    Stop,
    /// Driven interval between the end bit and the cutout (TCS)
    CutoutLead,
    /// Track released for the BiDi response window
    Cutout,
}

/// Transmit state machine, owned by the timer-update interrupt.
pub struct TimingEngine<'q, T: TrackOutputs> {
    shared: &'q CsShared,
    packets: PacketConsumer<'q>,
    io: T,
    cfg: TimingConfig,
    state: TxState,
    second_half: bool,
    preamble_left: u8,
    packet: Packet,
    byte_idx: u8,
    bit_idx: u8,
    /// Index of the bit being emitted, counted from the packet start bit
    packet_bit: u32,
}

impl<'q, T: TrackOutputs> TimingEngine<'q, T> {
    /// Create an engine in the idle state. `io` is the uniquely owned track
    /// driver stage; `packets` is the consumer half of the controller's
    /// queue.
    pub fn new(shared: &'q CsShared, packets: PacketConsumer<'q>, io: T) -> Self {
        Self {
            shared,
            packets,
            io,
            cfg: TimingConfig::nominal(),
            state: TxState::Idle,
            second_half: false,
            preamble_left: 0,
            packet: Packet::idle(),
            byte_idx: 0,
            bit_idx: 0,
            packet_bit: 0,
        }
    }

    /// Timer-update interrupt body.
    ///
    /// Returns the next auto-reload value in microseconds, or `None` once the
    /// engine has halted (the glue then disables the timer). The outputs for
    /// the period being returned have already been driven.
    pub fn on_timer_update(&mut self) -> Option<u32> {
        if self.state == TxState::Idle {
            if !self.shared.take_start_request() {
                return None;
            }
            self.begin_packet();
            self.shared.set_running(true);
        }
        Some(self.emit_half())
    }

    /// Access the owned output stage (test observation).
    pub fn io(&self) -> &T {
        &self.io
    }

    /// Mutable access to the owned output stage (test setup).
    pub fn io_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Snapshot the configuration and begin the next packet. Called at every
    /// inter-packet boundary, which is what makes parameter and BiDi changes
    /// take effect between packets and never mid-packet.
    fn begin_packet(&mut self) {
        self.cfg = TimingConfig::from_bits(self.shared.config_bits());
        self.packet = self.packets.dequeue().unwrap_or_else(Packet::idle);
        self.state = TxState::Preamble;
        self.second_half = false;
        self.preamble_left = self.cfg.num_preamble;
        self.byte_idx = 0;
        self.bit_idx = 0;
        self.packet_bit = 0;
    }

    fn emit_half(&mut self) -> u32 {
        let period = match self.state {
            TxState::CutoutLead => {
                // The booster keeps driving until TCS has elapsed.
                self.io.drive(false, true);
                bidi::TCS_US
            }
            TxState::Cutout => {
                self.io.drive(false, false);
                self.io.cutout_start();
                bidi::CUTOUT_HOLD_US
            }
            _ => {
                if self.cfg.trigger_first_bit
                    && self.state == TxState::Preamble
                    && self.preamble_left == self.cfg.num_preamble
                {
                    self.io.scope_trigger(!self.second_half);
                }
                if self.second_half {
                    self.io.drive(true, false);
                } else {
                    self.io.drive(false, true);
                }
                self.bit_period_us()
            }
        };
        self.advance();
        period
    }

    fn current_bit(&self) -> u8 {
        match self.state {
            TxState::Preamble | TxState::Stop => 1,
            TxState::Start => 0,
            TxState::Data => {
                (self.packet.bytes()[self.byte_idx as usize] >> (7 - self.bit_idx)) & 1
            }
            _ => 1,
        }
    }

    fn bit_period_us(&self) -> u32 {
        let base = if self.current_bit() == 1 {
            self.cfg.bit1_duration_us as u32
        } else {
            self.cfg.bit0_duration_us as u32
        };

        // Override applies to packet bits whose auto-reload qualifies as a
        // logical 0; the preamble is never adjusted.
        if self.state != TxState::Preamble && base >= dcc::TX_MIN_BIT0_US {
            let ovr = self.shared.override_map();
            if ovr.selects(self.packet_bit) {
                let delta = if self.second_half {
                    ovr.delta_n
                } else {
                    ovr.delta_p
                };
                return (base as i64 + delta as i64).clamp(1, u32::MAX as i64) as u32;
            }
        }
        base
    }

    fn advance(&mut self) {
        match self.state {
            TxState::CutoutLead => {
                self.state = TxState::Cutout;
                return;
            }
            TxState::Cutout => {
                self.io.cutout_end();
                self.finish_packet();
                return;
            }
            _ => {}
        }

        if !self.second_half {
            self.second_half = true;
            return;
        }
        self.second_half = false;

        // A logical bit just completed.
        match self.state {
            TxState::Preamble => {
                self.preamble_left -= 1;
                if self.preamble_left == 0 {
                    self.state = TxState::Start;
                }
            }
            TxState::Start => {
                self.packet_bit += 1;
                self.bit_idx = 0;
                self.state = TxState::Data;
            }
            TxState::Data => {
                self.packet_bit += 1;
                self.bit_idx += 1;
                if self.bit_idx == 8 {
                    self.byte_idx += 1;
                    if self.byte_idx as usize == self.packet.len() {
                        self.state = TxState::Stop;
                    } else {
                        self.state = TxState::Start;
                    }
                }
            }
            TxState::Stop => {
                self.packet_bit += 1;
                if self.cfg.bidi_enable {
                    self.state = TxState::CutoutLead;
                } else {
                    self.finish_packet();
                }
            }
            _ => {}
        }
    }

    fn finish_packet(&mut self) {
        self.shared.count_packet();
        if self.shared.take_stop_request() {
            self.io.drive(false, false);
            // Discard packets queued after the stop was requested.
            while self.packets.dequeue().is_some() {}
            self.shared.set_running(false);
            self.state = TxState::Idle;
            return;
        }
        self.begin_packet();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcc::{packet, PacketQueue};
    use crate::platform::mock::{MockTrackOutputs, TrackEvent};
    use crate::station::OverrideMap;

    fn start_engine<'q>(
        shared: &'q CsShared,
        queue: &'q mut PacketQueue,
        cfg: TimingConfig,
    ) -> TimingEngine<'q, MockTrackOutputs> {
        let (_, consumer) = queue.split();
        let engine = TimingEngine::new(shared, consumer, MockTrackOutputs::new());
        shared.request_start(cfg);
        engine
    }

    /// Collect half-periods for exactly one packet (preamble through stop /
    /// cutout), assuming the engine is at a packet boundary.
    fn collect_packet(engine: &mut TimingEngine<'_, MockTrackOutputs>) -> Vec<u32> {
        let before = engine.shared.packets_sent();
        let mut halves = Vec::new();
        while engine.shared.packets_sent() == before {
            halves.push(engine.on_timer_update().expect("engine running"));
        }
        halves
    }

    #[test]
    fn idle_when_never_started() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (_, consumer) = queue.split();
        let mut engine = TimingEngine::new(&shared, consumer, MockTrackOutputs::new());
        assert_eq!(engine.on_timer_update(), None);
        assert!(!shared.is_running());
    }

    #[test]
    fn idle_packet_framing() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(&shared, &mut queue, TimingConfig::nominal());

        let halves = collect_packet(&mut engine);
        // 17 preamble + start + 3 bytes with separators + stop = 45 bits.
        assert_eq!(halves.len(), 90);
        // Preamble: 34 one-halves.
        assert!(halves[..34].iter().all(|&us| us == 58));
        // Start bit.
        assert_eq!(&halves[34..36], &[100, 100]);
        // 0xFF data byte.
        assert!(halves[36..52].iter().all(|&us| us == 58));
        // Separator, then 0x00 byte.
        assert!(halves[52..70].iter().all(|&us| us == 100));
        // Separator, then 0xFF byte.
        assert_eq!(&halves[70..72], &[100, 100]);
        assert!(halves[72..88].iter().all(|&us| us == 58));
        // Stop bit.
        assert_eq!(&halves[88..90], &[58, 58]);
    }

    #[test]
    fn queued_packet_is_transmitted() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (mut producer, consumer) = queue.split();
        let mut engine = TimingEngine::new(&shared, consumer, MockTrackOutputs::new());

        producer
            .enqueue(packet::make_speed(3, 42).unwrap())
            .unwrap();
        shared.request_start(TimingConfig::nominal());

        let halves = collect_packet(&mut engine);
        // 4 octets: 17 preamble + 4 framed bytes (start/separator plus 8
        // data bits each) + stop = 54 bits.
        assert_eq!(halves.len(), 108);

        // Next packet falls back to idle (3 octets, 45 bits).
        let halves = collect_packet(&mut engine);
        assert_eq!(halves.len(), 90);
    }

    #[test]
    fn phases_alternate_per_half() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(&shared, &mut queue, TimingConfig::nominal());

        for _ in 0..10 {
            engine.on_timer_update();
        }
        let drives: Vec<(bool, bool)> = engine
            .io()
            .events()
            .iter()
            .filter_map(|e| match e {
                TrackEvent::Drive(n, p) => Some((*n, *p)),
                _ => None,
            })
            .collect();
        assert_eq!(drives.len(), 10);
        for (i, &(n, p)) in drives.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!((n, p), (false, true));
            } else {
                assert_eq!((n, p), (true, false));
            }
        }
    }

    #[test]
    fn override_adjusts_only_selected_zero_bit() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let (mut producer, consumer) = queue.split();
        let mut engine = TimingEngine::new(&shared, consumer, MockTrackOutputs::new());

        // All-zero payload so every packet bit is a logical 0.
        producer
            .enqueue(Packet::from_bytes(&[0x00, 0x00, 0x00]).unwrap())
            .unwrap();
        shared.request_start(TimingConfig::nominal());
        shared.set_override(OverrideMap {
            mask: 1 << 4,
            delta_p: 10,
            delta_n: -10,
        });

        let halves = collect_packet(&mut engine);
        let preamble_halves = 17 * 2;
        // Packet bit k occupies halves [preamble + 2k, preamble + 2k + 1].
        // Bits 0..=26 are the start bit, data and separators (all zeros for
        // this payload); bit 27 is the stop bit.
        for bit in 0..28 {
            let first = halves[preamble_halves + 2 * bit];
            let second = halves[preamble_halves + 2 * bit + 1];
            let base = if bit != 27 { 100 } else { 58 };
            if bit == 4 {
                assert_eq!(first, base + 10, "bit {} positive half", bit);
                assert_eq!(second, base - 10, "bit {} negative half", bit);
            } else {
                assert_eq!(first, base, "bit {} positive half", bit);
                assert_eq!(second, base, "bit {} negative half", bit);
            }
        }
    }

    #[test]
    fn stop_completes_packet_then_halts() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(&shared, &mut queue, TimingConfig::nominal());

        // Into the middle of the first packet.
        for _ in 0..40 {
            engine.on_timer_update();
        }
        shared.request_stop();

        // The engine finishes the current packet, then halts.
        let mut remaining = 0;
        while engine.on_timer_update().is_some() {
            remaining += 1;
            assert!(remaining < 200, "engine failed to halt");
        }
        assert!(!shared.is_running());
        assert_eq!(shared.packets_sent(), 1);
        assert_eq!(engine.io().last_drive(), Some((false, false)));

        // Restart works and re-reads the config.
        shared.request_start(TimingConfig {
            num_preamble: 20,
            ..TimingConfig::nominal()
        });
        let halves = collect_packet(&mut engine);
        assert_eq!(halves.len(), 2 * 20 + 2 * 28);
    }

    #[test]
    fn bidi_cutout_follows_stop_bit() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(
            &shared,
            &mut queue,
            TimingConfig {
                bidi_enable: true,
                ..TimingConfig::nominal()
            },
        );

        let halves = collect_packet(&mut engine);
        // Idle packet bits plus the cutout lead and hold periods.
        assert_eq!(halves.len(), 92);
        assert_eq!(halves[90], bidi::TCS_US);
        assert_eq!(halves[91], bidi::CUTOUT_HOLD_US);
        assert_eq!(engine.io().cutout_count(), 1);
        assert!(!engine.io().in_cutout());
    }

    #[test]
    fn bidi_toggle_applies_at_packet_boundary() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(&shared, &mut queue, TimingConfig::nominal());

        // Enable BiDi mid-packet; the current packet must stay cutout-free.
        for _ in 0..10 {
            engine.on_timer_update();
        }
        shared.publish_config(TimingConfig {
            bidi_enable: true,
            ..TimingConfig::nominal()
        });
        while shared.packets_sent() == 0 {
            engine.on_timer_update();
        }
        assert_eq!(engine.io().cutout_count(), 0);

        // The next packet carries the cutout.
        let halves = collect_packet(&mut engine);
        assert_eq!(halves.len(), 92);
        assert_eq!(engine.io().cutout_count(), 1);
    }

    #[test]
    fn scope_trigger_marks_first_bit() {
        let shared = CsShared::new();
        let mut queue = PacketQueue::new();
        let mut engine = start_engine(
            &shared,
            &mut queue,
            TimingConfig {
                trigger_first_bit: true,
                ..TimingConfig::nominal()
            },
        );

        let _ = collect_packet(&mut engine);
        let scopes: Vec<bool> = engine
            .io()
            .events()
            .iter()
            .filter_map(|e| match e {
                TrackEvent::Scope(high) => Some(*high),
                _ => None,
            })
            .collect();
        // One pulse per packet: high on the first half, low on the second.
        assert_eq!(scopes, vec![true, false]);
    }
}
