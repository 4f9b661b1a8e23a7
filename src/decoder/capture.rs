//! Waveform capture and bit assembly
//!
//! Runs in the timer input-capture interrupt: every edge yields one
//! half-period sample in microseconds. Two consecutive samples form a logical
//! bit when both fall inside the same acceptance window; anything else is a
//! framing error and the receiver resynchronizes by hunting for a preamble.
//!
//! Valid packets (length and XOR checked) are pushed into the spsc queue the
//! decoder controller drains; failures only bump counters, never propagate.

use crate::dcc::{self, Packet, PacketProducer, MAX_PACKET_SIZE, MIN_PACKET_SIZE};

use super::DecoderShared;

/// Half-period acceptance windows in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitWindows {
    /// Logical 1 lower edge
    pub one_min_us: u32,
    /// Logical 1 upper edge
    pub one_max_us: u32,
    /// Logical 0 lower edge
    pub zero_min_us: u32,
    /// Logical 0 upper edge (stretched zeros run to several milliseconds)
    pub zero_max_us: u32,
}

impl Default for BitWindows {
    fn default() -> Self {
        Self {
            one_min_us: dcc::RX_ONE_MIN_US,
            one_max_us: dcc::RX_ONE_MAX_US,
            zero_min_us: dcc::RX_ZERO_MIN_US,
            zero_max_us: dcc::RX_ZERO_MAX_US,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HalfKind {
    One,
    Zero,
    Invalid,
}

impl BitWindows {
    fn classify(&self, us: u32) -> HalfKind {
        if (self.one_min_us..=self.one_max_us).contains(&us) {
            HalfKind::One
        } else if (self.zero_min_us..=self.zero_max_us).contains(&us) {
            HalfKind::Zero
        } else {
            HalfKind::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// Searching for a preamble: counting consecutive one-halves
    Hunt,
    /// Inside a packet, assembling the start bit, data bits or separators
    Packet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitSlot {
    /// Packet start bit (must be 0)
    Start,
    /// Data bit of the current octet
    Data,
    /// Byte separator (0) or packet end bit (1)
    Separator,
}

/// Input-capture state machine, owned by the capture interrupt.
pub struct WaveformCapture<'q> {
    shared: &'q DecoderShared,
    delivered: PacketProducer<'q>,
    windows: BitWindows,
    state: RxState,
    slot: BitSlot,
    /// Consecutive one-halves seen while hunting
    hunt_ones: u32,
    /// First half of the bit being assembled
    pending: Option<HalfKind>,
    packet: Packet,
    byte_acc: u8,
    bits_in_byte: u8,
}

impl<'q> WaveformCapture<'q> {
    /// Create a capture unit in hunt state with the given acceptance windows.
    pub fn new(
        shared: &'q DecoderShared,
        delivered: PacketProducer<'q>,
        windows: BitWindows,
    ) -> Self {
        Self {
            shared,
            delivered,
            windows,
            state: RxState::Hunt,
            slot: BitSlot::Start,
            hunt_ones: 0,
            pending: None,
            packet: Packet::new(),
            byte_acc: 0,
            bits_in_byte: 0,
        }
    }

    /// Input-capture interrupt body: feed one half-period sample.
    pub fn on_capture(&mut self, half_period_us: u32) {
        let kind = self.windows.classify(half_period_us);
        match self.state {
            RxState::Hunt => self.hunt(kind),
            RxState::Packet => self.assemble(kind),
        }
    }

    /// Capture counter overflow: the edge stream broke, resynchronize.
    pub fn on_capture_overflow(&mut self) {
        self.shared.count_resync();
        self.resync();
    }

    fn resync(&mut self) {
        self.state = RxState::Hunt;
        self.hunt_ones = 0;
        self.pending = None;
    }

    fn hunt(&mut self, kind: HalfKind) {
        match kind {
            HalfKind::One => self.hunt_ones += 1,
            HalfKind::Zero if self.hunt_ones >= 2 * dcc::RX_PREAMBLE_MIN_BITS as u32 => {
                // Preamble seen; this zero half opens the packet start bit.
                self.state = RxState::Packet;
                self.slot = BitSlot::Start;
                self.pending = Some(HalfKind::Zero);
                self.packet = Packet::new();
                self.byte_acc = 0;
                self.bits_in_byte = 0;
            }
            _ => self.hunt_ones = 0,
        }
    }

    fn assemble(&mut self, kind: HalfKind) {
        let Some(first) = self.pending.take() else {
            self.pending = Some(kind);
            return;
        };

        // Both halves must land in the same window.
        let bit = match (first, kind) {
            (HalfKind::One, HalfKind::One) => 1u8,
            (HalfKind::Zero, HalfKind::Zero) => 0u8,
            _ => {
                self.shared.count_framing_error();
                self.resync();
                return;
            }
        };
        self.complete_bit(bit);
    }

    fn complete_bit(&mut self, bit: u8) {
        match self.slot {
            BitSlot::Start => {
                // Entered with a zero half by construction.
                self.slot = BitSlot::Data;
                self.byte_acc = 0;
                self.bits_in_byte = 0;
            }
            BitSlot::Data => {
                self.byte_acc = (self.byte_acc << 1) | bit;
                self.bits_in_byte += 1;
                if self.bits_in_byte == 8 {
                    if self.packet.push(self.byte_acc).is_err() {
                        // Longer than any legal packet.
                        self.shared.count_framing_error();
                        self.resync();
                        return;
                    }
                    self.slot = BitSlot::Separator;
                }
            }
            BitSlot::Separator => {
                if bit == 0 {
                    // Data-start bit of the next octet.
                    self.slot = BitSlot::Data;
                    self.byte_acc = 0;
                    self.bits_in_byte = 0;
                } else {
                    self.finish_packet();
                    // The end bit doubles as the first preamble one of the
                    // next packet.
                    self.resync();
                    self.hunt_ones = 2;
                }
            }
        }
    }

    fn finish_packet(&mut self) {
        if self.packet.len() < MIN_PACKET_SIZE || self.packet.len() > MAX_PACKET_SIZE {
            self.shared.count_framing_error();
            return;
        }
        if self.packet.checksum_residue() != 0 {
            self.shared.count_crc_error();
            return;
        }
        if self.delivered.enqueue(self.packet).is_err() {
            self.shared.count_queue_overflow();
            return;
        }
        self.shared.count_packet();
        self.shared.raise_packet_end();
    }
}
