//! DCC protocol primitives
//!
//! Packet construction and validation per NMRA S-9.2/S-9.2.1, the timing
//! constants of S-9.1, and BiDi datagram framing per S-9.3.2. Everything in
//! this module is plain data and free of hardware concerns; the station and
//! decoder modules consume it from both task and interrupt context.

pub mod bidi;
pub mod packet;

pub use packet::{Packet, PacketError};

/// Largest packet the station transmits or the decoder assembles, in octets.
pub const MAX_PACKET_SIZE: usize = 18;

/// Smallest well-formed packet: address, one data octet, XOR trailer.
pub const MIN_PACKET_SIZE: usize = 3;

/// Minimum number of preamble one-bits a command station must emit (S-9.2).
pub const TX_PREAMBLE_MIN_BITS: u8 = 14;

/// Minimum run of one-bits a decoder must accept as a preamble (S-9.2).
pub const RX_PREAMBLE_MIN_BITS: u8 = 10;

/// Nominal half-period of a logical 1 in microseconds (S-9.1: 58 +/- 3).
pub const BIT1_NOMINAL_US: u8 = 58;

/// Nominal half-period of a logical 0 in microseconds.
pub const BIT0_NOMINAL_US: u8 = 100;

/// Shortest transmit half-period that still counts as a logical 0.
///
/// The bit-level override mechanism keys off this threshold: a programmed
/// auto-reload at or above it is treated as a zero bit.
pub const TX_MIN_BIT0_US: u32 = 90;

/// Decoder acceptance window for a logical 1 half-period (S-9.1 receive side).
pub const RX_ONE_MIN_US: u32 = 52;
/// Upper edge of the logical 1 acceptance window.
pub const RX_ONE_MAX_US: u32 = 64;
/// Lower edge of the logical 0 acceptance window.
pub const RX_ZERO_MIN_US: u32 = 90;
/// Upper edge of the logical 0 acceptance window; a stretched zero may be
/// several milliseconds long.
pub const RX_ZERO_MAX_US: u32 = 10_000;

/// Short (7-bit) loco address upper bound.
pub const SHORT_ADDRESS_MAX: u16 = 127;
/// Extended (14-bit) loco address upper bound.
pub const EXTENDED_ADDRESS_MAX: u16 = 10_239;

/// Depth of the packet queues between controllers and the waveform ISRs.
///
/// `heapless::spsc` keeps one slot unused, so seven packets can be in flight.
pub const PACKET_QUEUE_DEPTH: usize = 8;

/// Queue type for controller-to-ISR (and ISR-to-controller) packet exchange.
pub type PacketQueue = heapless::spsc::Queue<Packet, PACKET_QUEUE_DEPTH>;
/// Producer half of a [`PacketQueue`].
pub type PacketProducer<'a> = heapless::spsc::Producer<'a, Packet, PACKET_QUEUE_DEPTH>;
/// Consumer half of a [`PacketQueue`].
pub type PacketConsumer<'a> = heapless::spsc::Consumer<'a, Packet, PACKET_QUEUE_DEPTH>;
