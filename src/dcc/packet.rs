//! DCC packet construction and validation
//!
//! A packet is the address octet(s), up to four data octets and the XOR error
//! trailer; the preamble and framing bits are added by the timing engine at
//! transmit time. Builders cover the instructions the test loops and the
//! acceptance scripts use: 128-step and 28-step speed, the three classic
//! function groups, operations-mode CV access and the broadcast emergency
//! stop.

use super::{EXTENDED_ADDRESS_MAX, MAX_PACKET_SIZE, MIN_PACKET_SIZE, SHORT_ADDRESS_MAX};

/// Advanced operations instruction (001xxxxx), 128-step speed sub-code.
const INST_ADVANCED_128_SPEED: u8 = 0b0011_1111;
/// Basic speed instruction, reverse (010SSSSS).
const INST_SPEED_REVERSE: u8 = 0b0100_0000;
/// Basic speed instruction, forward (011SSSSS).
const INST_SPEED_FORWARD: u8 = 0b0110_0000;
/// Function group one, FL + F1-F4 (100xxxxx).
const INST_F0_F4: u8 = 0b1000_0000;
/// Function group two, F5-F8 (1011xxxx).
const INST_F5_F8: u8 = 0b1011_0000;
/// Function group two, F9-F12 (1010xxxx).
const INST_F9_F12: u8 = 0b1010_0000;
/// Operations-mode CV access short form (1110KKVV).
const INST_CV_ACCESS: u8 = 0b1110_0000;
/// CV access sub-code: verify byte.
const CV_OP_VERIFY: u8 = 0b0000_0100;
/// CV access sub-code: write byte.
const CV_OP_WRITE: u8 = 0b0000_1100;

/// Packet construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Address outside 0..=10239
    AddressOutOfRange,
    /// Speed step outside the encodable range
    StepOutOfRange,
    /// Function bits outside the selected group
    FunctionBitsOutOfRange,
    /// CV number outside 1..=1024
    CvOutOfRange,
    /// Packet would exceed [`MAX_PACKET_SIZE`] or is shorter than [`MIN_PACKET_SIZE`]
    InvalidLength,
}

/// One DCC packet: 3..=18 octets, the last being the XOR of all others.
///
/// `Copy` so packets travel by value through the lock-free queues between
/// the controllers and the waveform interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    bytes: [u8; MAX_PACKET_SIZE],
    len: u8,
}

impl Packet {
    /// Create an empty packet (builders push octets into it).
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_PACKET_SIZE],
            len: 0,
        }
    }

    /// The idle packet: address 0xFF, data 0x00, XOR 0xFF. Emitted whenever
    /// the transmit queue runs dry so the bus never falls silent.
    pub const fn idle() -> Self {
        let mut bytes = [0; MAX_PACKET_SIZE];
        bytes[0] = 0xFF;
        bytes[1] = 0x00;
        bytes[2] = 0xFF;
        Self { bytes, len: 3 }
    }

    /// Build a packet from raw octets, appending nothing. Used by the RPC
    /// custom-packet path where the host supplies the complete frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.is_empty() || data.len() > MAX_PACKET_SIZE {
            return Err(PacketError::InvalidLength);
        }
        let mut packet = Self::new();
        packet.bytes[..data.len()].copy_from_slice(data);
        packet.len = data.len() as u8;
        Ok(packet)
    }

    /// Append one octet.
    pub fn push(&mut self, byte: u8) -> Result<(), PacketError> {
        if (self.len as usize) >= MAX_PACKET_SIZE {
            return Err(PacketError::InvalidLength);
        }
        self.bytes[self.len as usize] = byte;
        self.len += 1;
        Ok(())
    }

    /// Finalize the packet by appending the XOR of all preceding octets.
    pub fn append_xor(&mut self) -> Result<(), PacketError> {
        let xor = self.bytes[..self.len as usize]
            .iter()
            .fold(0u8, |acc, &b| acc ^ b);
        self.push(xor)
    }

    /// The packet octets.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Octet count.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for a zero-length packet under construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// XOR-fold over the whole packet; zero for a well-formed packet.
    pub fn checksum_residue(&self) -> u8 {
        self.bytes().iter().fold(0u8, |acc, &b| acc ^ b)
    }

    /// True when the packet has a plausible length and a zero XOR residue.
    pub fn is_valid(&self) -> bool {
        self.len() >= MIN_PACKET_SIZE && self.checksum_residue() == 0
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the S-9.2.1 address encoding: one octet for short addresses
/// (1..=127) and the broadcast address 0, two octets with the `11` prefix for
/// extended addresses (128..=10239).
fn push_address(packet: &mut Packet, addr: u16) -> Result<(), PacketError> {
    match addr {
        0..=SHORT_ADDRESS_MAX => packet.push(addr as u8),
        128..=EXTENDED_ADDRESS_MAX => {
            packet.push(0b1100_0000 | (addr >> 8) as u8)?;
            packet.push(addr as u8)
        }
        _ => Err(PacketError::AddressOutOfRange),
    }
}

/// Build a 128-step speed packet (advanced operations, instruction `0x3F`).
///
/// `step` carries the direction in its sign: positive is forward, negative is
/// reverse, magnitude 0..=126 selects the speed step (0 = stop). A reverse
/// stop cannot be expressed this way; use [`make_speed_dir`] where the
/// direction of a stop matters.
pub fn make_speed(addr: u16, step: i8) -> Result<Packet, PacketError> {
    if step == i8::MIN || step.unsigned_abs() > 126 {
        return Err(PacketError::StepOutOfRange);
    }
    make_speed_dir(addr, step >= 0, step.unsigned_abs())
}

/// Build a 128-step speed packet with an explicit direction.
pub fn make_speed_dir(addr: u16, forward: bool, step: u8) -> Result<Packet, PacketError> {
    if step > 126 {
        return Err(PacketError::StepOutOfRange);
    }
    // Steps 1..=126 map to codes 2..=127; code 1 is reserved for e-stop.
    let code = if step == 0 { 0 } else { step + 1 };

    let mut packet = Packet::new();
    push_address(&mut packet, addr)?;
    packet.push(INST_ADVANCED_128_SPEED)?;
    packet.push(((forward as u8) << 7) | code)?;
    packet.append_xor()?;
    Ok(packet)
}

/// Build a 28-step basic speed packet (instruction `01DCSSSS`).
pub fn make_basic_speed(addr: u16, forward: bool, step: u8) -> Result<Packet, PacketError> {
    if step > 28 {
        return Err(PacketError::StepOutOfRange);
    }
    // Steps 1..=28 map to codes 4..=31; the C bit is the code LSB.
    let code = if step == 0 { 0 } else { step + 3 };
    let five_bits = ((code & 0x01) << 4) | (code >> 1);

    let base = if forward {
        INST_SPEED_FORWARD
    } else {
        INST_SPEED_REVERSE
    };

    let mut packet = Packet::new();
    push_address(&mut packet, addr)?;
    packet.push(base | five_bits)?;
    packet.append_xor()?;
    Ok(packet)
}

/// Function groups addressable with a single instruction octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionGroup {
    /// FL/F0 (bit 4) and F1-F4 (bits 0..=3)
    F0F4,
    /// F5-F8 (bits 0..=3)
    F5F8,
    /// F9-F12 (bits 0..=3)
    F9F12,
}

/// Build a function group packet. `bits` uses the in-group layout documented
/// on [`FunctionGroup`].
pub fn make_function_group(
    addr: u16,
    group: FunctionGroup,
    bits: u8,
) -> Result<Packet, PacketError> {
    let instruction = match group {
        FunctionGroup::F0F4 => {
            if bits > 0b1_1111 {
                return Err(PacketError::FunctionBitsOutOfRange);
            }
            INST_F0_F4 | bits
        }
        FunctionGroup::F5F8 => {
            if bits > 0b1111 {
                return Err(PacketError::FunctionBitsOutOfRange);
            }
            INST_F5_F8 | bits
        }
        FunctionGroup::F9F12 => {
            if bits > 0b1111 {
                return Err(PacketError::FunctionBitsOutOfRange);
            }
            INST_F9_F12 | bits
        }
    };

    let mut packet = Packet::new();
    push_address(&mut packet, addr)?;
    packet.push(instruction)?;
    packet.append_xor()?;
    Ok(packet)
}

fn make_cv_access(addr: u16, op: u8, cv: u16, value: u8) -> Result<Packet, PacketError> {
    if cv == 0 || cv > 1024 {
        return Err(PacketError::CvOutOfRange);
    }
    let cv_index = cv - 1;

    let mut packet = Packet::new();
    push_address(&mut packet, addr)?;
    packet.push(INST_CV_ACCESS | op | (cv_index >> 8) as u8)?;
    packet.push(cv_index as u8)?;
    packet.push(value)?;
    packet.append_xor()?;
    Ok(packet)
}

/// Build an operations-mode CV write packet (short form, write byte).
/// `cv` is the 1-based CV number.
pub fn make_cv_write(addr: u16, cv: u16, value: u8) -> Result<Packet, PacketError> {
    make_cv_access(addr, CV_OP_WRITE, cv, value)
}

/// Build an operations-mode CV verify packet (short form, verify byte).
pub fn make_cv_verify(addr: u16, cv: u16, value: u8) -> Result<Packet, PacketError> {
    make_cv_access(addr, CV_OP_VERIFY, cv, value)
}

/// Build the broadcast emergency stop packet `[0x00, 0x41, 0x41]`
/// (basic speed instruction, speed code 1).
pub fn make_broadcast_emergency_stop() -> Packet {
    let mut packet = Packet::new();
    // Infallible: three pushes into an empty 18-octet buffer.
    let _ = packet.push(0x00);
    let _ = packet.push(INST_SPEED_REVERSE | 0b0_0001);
    let _ = packet.append_xor();
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_closure_over_builders() {
        let packets = [
            make_speed(3, 42).unwrap(),
            make_speed(3, -42).unwrap(),
            make_speed(9000, 126).unwrap(),
            make_basic_speed(3, true, 14).unwrap(),
            make_function_group(3, FunctionGroup::F0F4, 0b1_0001).unwrap(),
            make_function_group(42, FunctionGroup::F5F8, 0b0101).unwrap(),
            make_cv_write(3, 8, 0xAA).unwrap(),
            make_cv_verify(3, 1, 0x03).unwrap(),
            make_broadcast_emergency_stop(),
            Packet::idle(),
        ];
        for p in &packets {
            assert_eq!(p.checksum_residue(), 0, "{:?}", p);
            assert!(p.is_valid());
        }
    }

    #[test]
    fn speed_packet_encoding() {
        // Forward step 42 at address 3: code 43, direction bit set.
        let p = make_speed(3, 42).unwrap();
        assert_eq!(p.bytes(), &[0x03, 0x3F, 0x80 | 43, 0x03 ^ 0x3F ^ (0x80 | 43)]);

        // Reverse stop.
        let p = make_speed(3, -0i8).unwrap();
        assert_eq!(p.bytes()[2], 0x80); // -0 collapses to forward stop
        let p = make_speed(3, -1).unwrap();
        assert_eq!(p.bytes()[2], 2);
    }

    #[test]
    fn extended_address_prefix() {
        let p = make_speed(200, 1).unwrap();
        assert_eq!(p.bytes()[0], 0b1100_0000);
        assert_eq!(p.bytes()[1], 200);

        let p = make_speed(10_239, 1).unwrap();
        assert_eq!(p.bytes()[0], 0b1100_0000 | 0x27);
        assert_eq!(p.bytes()[1], 0xFF);
    }

    #[test]
    fn address_range_enforced() {
        assert_eq!(make_speed(10_240, 1), Err(PacketError::AddressOutOfRange));
        assert!(make_speed(SHORT_ADDRESS_MAX, 1).is_ok());
        assert!(make_speed(128, 1).is_ok());
    }

    #[test]
    fn step_range_enforced() {
        assert_eq!(make_speed(3, 127), Err(PacketError::StepOutOfRange));
        assert_eq!(make_speed(3, -127), Err(PacketError::StepOutOfRange));
        assert_eq!(make_basic_speed(3, true, 29), Err(PacketError::StepOutOfRange));
    }

    #[test]
    fn function_bits_enforced() {
        assert!(make_function_group(3, FunctionGroup::F0F4, 0b11_1111).is_err());
        assert!(make_function_group(3, FunctionGroup::F5F8, 0b1_0000).is_err());
    }

    #[test]
    fn cv_access_encoding() {
        // CV 1 encodes as index 0.
        let p = make_cv_write(3, 1, 0x55).unwrap();
        assert_eq!(p.bytes()[1], 0b1110_1100);
        assert_eq!(p.bytes()[2], 0x00);
        assert_eq!(p.bytes()[3], 0x55);

        // CV 1024 uses both high bits.
        let p = make_cv_verify(3, 1024, 0).unwrap();
        assert_eq!(p.bytes()[1] & 0x03, 0x03);
        assert_eq!(p.bytes()[2], 0xFF);

        assert_eq!(make_cv_write(3, 0, 0), Err(PacketError::CvOutOfRange));
        assert_eq!(make_cv_write(3, 1025, 0), Err(PacketError::CvOutOfRange));
    }

    #[test]
    fn emergency_stop_is_broadcast() {
        let p = make_broadcast_emergency_stop();
        assert_eq!(p.bytes(), &[0x00, 0x41, 0x41]);
    }

    #[test]
    fn from_bytes_bounds() {
        assert!(Packet::from_bytes(&[]).is_err());
        assert!(Packet::from_bytes(&[0u8; MAX_PACKET_SIZE + 1]).is_err());
        let p = Packet::from_bytes(&[0x03, 0x3F, 0x2A, 0x16]).unwrap();
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn corrupted_packet_detected() {
        let mut p = make_speed(3, 10).unwrap();
        let mut raw = [0u8; MAX_PACKET_SIZE];
        raw[..p.len()].copy_from_slice(p.bytes());
        raw[1] ^= 0x10;
        p = Packet::from_bytes(&raw[..p.len()]).unwrap();
        assert!(!p.is_valid());
    }
}
