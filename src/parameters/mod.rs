//! Persistent parameter manager
//!
//! Keeps an in-RAM shadow of every configuration parameter and persists it to
//! a dedicated flash sector behind a `{magic, version, crc32, data_size,
//! payload}` header. The sector is erased before each save, so a crash
//! mid-write leaves the magic unprogrammed and the next restore falls back to
//! defaults cleanly.
//!
//! Setters only mark the shadow dirty; nothing is written until `save` is
//! called explicitly. Restore validates magic, version, size and CRC against
//! a scratch buffer before the shadow is touched, so a rejected image never
//! corrupts the running configuration.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::platform::traits::FlashInterface;
use crate::platform::PlatformError;
use crate::station::TimingConfig;

/// Block identifier, "PARA" little-endian.
pub const PARAM_MAGIC: u32 = 0x5041_5241;
/// Layout version of the payload.
pub const PARAM_VERSION: u32 = 1;
/// Serialized payload size in bytes.
pub const PARAM_DATA_SIZE: usize = 512;
/// Header size: magic, version, crc32, data_size.
const HEADER_SIZE: usize = 16;
/// Flash offset of the parameter block (first sector of the data area).
const PARAM_FLASH_ADDR: u32 = 0;

// Fixed little-endian payload offsets, explicit padding included.
const OFF_TRACK_VOLTAGE: usize = 0;
const OFF_CURRENT_LIMIT: usize = 2;
const OFF_PREAMBLE_BITS: usize = 4;
const OFF_BIT1_DURATION: usize = 5;
const OFF_BIT0_DURATION: usize = 6;
const OFF_BIDI_ENABLE: usize = 7;
const OFF_TRIGGER_FIRST_BIT: usize = 8;
// one pad byte at 9
const OFF_SHORT_CIRCUIT: usize = 10;
const OFF_BIDI_DAC: usize = 12;
// two pad bytes at 14
const OFF_NET_IP: usize = 16;
const OFF_NET_MASK: usize = 20;
const OFF_NET_GATEWAY: usize = 24;
const OFF_NET_PORT: usize = 28;
// two pad bytes at 30
const OFF_DEVICE_ID: usize = 32;
const OFF_BAUD_RATE: usize = 36;
const OFF_DEBUG_LEVEL: usize = 40;
// three pad bytes at 41
const OFF_USER_PARAM_1: usize = 44;
const OFF_USER_PARAM_2: usize = 48;
const OFF_USER_PARAM_3: usize = 52;

/// Parameter manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// Operation before `init`
    NotInitialized,
    /// Stored block has the wrong magic (or the sector is erased)
    MagicMismatch,
    /// Stored block has an unsupported layout version
    VersionMismatch,
    /// Stored block advertises an unexpected payload size
    SizeMismatch,
    /// Stored payload fails its CRC
    CrcMismatch,
    /// Flash access failed
    Flash(PlatformError),
}

impl From<PlatformError> for ParamError {
    fn from(err: PlatformError) -> Self {
        ParamError::Flash(err)
    }
}

/// In-RAM parameter shadow. Field set and defaults match the production
/// configuration block; network and system entries are persisted for the
/// subsystems that consume them at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterData {
    /// Track voltage setpoint in millivolts
    pub track_voltage_mv: u16,
    /// Track current limit in milliamps
    pub track_current_limit_ma: u16,
    /// DCC preamble one-bits per packet
    pub preamble_bits: u8,
    /// Logical 1 half-period in microseconds
    pub bit1_duration_us: u8,
    /// Logical 0 half-period in microseconds
    pub bit0_duration_us: u8,
    /// BiDi cutout enabled
    pub bidi_enable: bool,
    /// Scope trigger on each packet's first bit
    pub trigger_first_bit: bool,
    /// Short-circuit trip threshold in milliamps
    pub short_circuit_threshold_ma: u16,
    /// BiDi comparator threshold (12-bit DAC value)
    pub bidi_dac: u16,
    /// Static IP address (big-endian u32)
    pub network_ip: u32,
    /// Subnet mask
    pub network_mask: u32,
    /// Default gateway
    pub network_gateway: u32,
    /// RPC-over-TCP port
    pub network_port: u16,
    /// Device identifier reported on the service interfaces
    pub device_id: u32,
    /// Console baud rate
    pub baud_rate: u32,
    /// Console verbosity 0..=4
    pub debug_level: u8,
    /// Uncommitted user words
    pub user_params: [u32; 3],
}

impl ParameterData {
    /// Compiled-in factory defaults.
    pub const fn defaults() -> Self {
        Self {
            track_voltage_mv: 15_000,
            track_current_limit_ma: 3_000,
            preamble_bits: 17,
            bit1_duration_us: 58,
            bit0_duration_us: 100,
            bidi_enable: false,
            trigger_first_bit: false,
            short_circuit_threshold_ma: 5_000,
            bidi_dac: 2048,
            network_ip: 0xC0A8_0164,   // 192.168.1.100
            network_mask: 0xFFFF_FF00, // 255.255.255.0
            network_gateway: 0xC0A8_0101,
            network_port: 2560,
            device_id: 1,
            baud_rate: 115_200,
            debug_level: 2,
            user_params: [0; 3],
        }
    }

    /// Serialize into the fixed payload layout. Pad bytes stay zero.
    fn to_bytes(self) -> [u8; PARAM_DATA_SIZE] {
        let mut buf = [0u8; PARAM_DATA_SIZE];
        buf[OFF_TRACK_VOLTAGE..OFF_TRACK_VOLTAGE + 2]
            .copy_from_slice(&self.track_voltage_mv.to_le_bytes());
        buf[OFF_CURRENT_LIMIT..OFF_CURRENT_LIMIT + 2]
            .copy_from_slice(&self.track_current_limit_ma.to_le_bytes());
        buf[OFF_PREAMBLE_BITS] = self.preamble_bits;
        buf[OFF_BIT1_DURATION] = self.bit1_duration_us;
        buf[OFF_BIT0_DURATION] = self.bit0_duration_us;
        buf[OFF_BIDI_ENABLE] = self.bidi_enable as u8;
        buf[OFF_TRIGGER_FIRST_BIT] = self.trigger_first_bit as u8;
        buf[OFF_SHORT_CIRCUIT..OFF_SHORT_CIRCUIT + 2]
            .copy_from_slice(&self.short_circuit_threshold_ma.to_le_bytes());
        buf[OFF_BIDI_DAC..OFF_BIDI_DAC + 2].copy_from_slice(&self.bidi_dac.to_le_bytes());
        buf[OFF_NET_IP..OFF_NET_IP + 4].copy_from_slice(&self.network_ip.to_le_bytes());
        buf[OFF_NET_MASK..OFF_NET_MASK + 4].copy_from_slice(&self.network_mask.to_le_bytes());
        buf[OFF_NET_GATEWAY..OFF_NET_GATEWAY + 4]
            .copy_from_slice(&self.network_gateway.to_le_bytes());
        buf[OFF_NET_PORT..OFF_NET_PORT + 2].copy_from_slice(&self.network_port.to_le_bytes());
        buf[OFF_DEVICE_ID..OFF_DEVICE_ID + 4].copy_from_slice(&self.device_id.to_le_bytes());
        buf[OFF_BAUD_RATE..OFF_BAUD_RATE + 4].copy_from_slice(&self.baud_rate.to_le_bytes());
        buf[OFF_DEBUG_LEVEL] = self.debug_level;
        for (i, word) in self.user_params.iter().enumerate() {
            let off = OFF_USER_PARAM_1 + 4 * i;
            buf[off..off + 4].copy_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Deserialize from the fixed payload layout.
    fn from_bytes(buf: &[u8; PARAM_DATA_SIZE]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([buf[off], buf[off + 1]]);
        let u32_at =
            |off: usize| u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        Self {
            track_voltage_mv: u16_at(OFF_TRACK_VOLTAGE),
            track_current_limit_ma: u16_at(OFF_CURRENT_LIMIT),
            preamble_bits: buf[OFF_PREAMBLE_BITS],
            bit1_duration_us: buf[OFF_BIT1_DURATION],
            bit0_duration_us: buf[OFF_BIT0_DURATION],
            bidi_enable: buf[OFF_BIDI_ENABLE] != 0,
            trigger_first_bit: buf[OFF_TRIGGER_FIRST_BIT] != 0,
            short_circuit_threshold_ma: u16_at(OFF_SHORT_CIRCUIT),
            bidi_dac: u16_at(OFF_BIDI_DAC),
            network_ip: u32_at(OFF_NET_IP),
            network_mask: u32_at(OFF_NET_MASK),
            network_gateway: u32_at(OFF_NET_GATEWAY),
            network_port: u16_at(OFF_NET_PORT),
            device_id: u32_at(OFF_DEVICE_ID),
            baud_rate: u32_at(OFF_BAUD_RATE),
            debug_level: buf[OFF_DEBUG_LEVEL],
            user_params: [
                u32_at(OFF_USER_PARAM_1),
                u32_at(OFF_USER_PARAM_2),
                u32_at(OFF_USER_PARAM_3),
            ],
        }
    }
}

impl Default for ParameterData {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Flash-backed parameter manager. The only writer of the parameter sector.
pub struct ParameterManager<F: FlashInterface> {
    flash: F,
    data: ParameterData,
    initialized: bool,
    dirty: bool,
}

impl<F: FlashInterface> ParameterManager<F> {
    /// Create an uninitialized manager owning the parameter flash.
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            data: ParameterData::defaults(),
            initialized: false,
            dirty: false,
        }
    }

    /// Initialize: load defaults, then try to hydrate from flash unless
    /// `force_defaults` is set. A failed restore is not an error; the
    /// defaults stay in place.
    pub fn init(&mut self, force_defaults: bool) -> Result<(), ParamError> {
        self.data = ParameterData::defaults();
        self.initialized = true;
        self.dirty = false;

        if !force_defaults && self.restore().is_err() {
            self.data = ParameterData::defaults();
            self.dirty = false;
        }
        Ok(())
    }

    /// Persist the shadow: erase the parameter sector, then program header
    /// and payload. On failure the shadow keeps its dirty flag and content.
    pub fn save(&mut self) -> Result<(), ParamError> {
        if !self.initialized {
            return Err(ParamError::NotInitialized);
        }

        let payload = self.data.to_bytes();
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&payload);

        let mut block = [0xFFu8; HEADER_SIZE + PARAM_DATA_SIZE];
        block[0..4].copy_from_slice(&PARAM_MAGIC.to_le_bytes());
        block[4..8].copy_from_slice(&PARAM_VERSION.to_le_bytes());
        block[8..12].copy_from_slice(&crc.to_le_bytes());
        block[12..16].copy_from_slice(&(PARAM_DATA_SIZE as u32).to_le_bytes());
        block[HEADER_SIZE..].copy_from_slice(&payload);

        let sector = self.flash.sector_size();
        self.flash.erase(PARAM_FLASH_ADDR, sector)?;
        self.flash.write(PARAM_FLASH_ADDR, &block)?;

        self.dirty = false;
        Ok(())
    }

    /// Re-hydrate the shadow from flash. The stored block must pass magic,
    /// version, size and CRC validation; otherwise the shadow is untouched
    /// and the specific rejection is returned.
    pub fn restore(&mut self) -> Result<(), ParamError> {
        if !self.initialized {
            return Err(ParamError::NotInitialized);
        }

        let mut block = [0u8; HEADER_SIZE + PARAM_DATA_SIZE];
        self.flash.read(PARAM_FLASH_ADDR, &mut block)?;

        let u32_at =
            |off: usize| u32::from_le_bytes([block[off], block[off + 1], block[off + 2], block[off + 3]]);
        if u32_at(0) != PARAM_MAGIC {
            return Err(ParamError::MagicMismatch);
        }
        if u32_at(4) != PARAM_VERSION {
            return Err(ParamError::VersionMismatch);
        }
        if u32_at(12) != PARAM_DATA_SIZE as u32 {
            return Err(ParamError::SizeMismatch);
        }

        let mut payload = [0u8; PARAM_DATA_SIZE];
        payload.copy_from_slice(&block[HEADER_SIZE..]);
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&payload);
        if crc != u32_at(8) {
            return Err(ParamError::CrcMismatch);
        }

        self.data = ParameterData::from_bytes(&payload);
        self.dirty = false;
        Ok(())
    }

    /// Reset to compiled defaults and persist them.
    pub fn factory_reset(&mut self) -> Result<(), ParamError> {
        self.data = ParameterData::defaults();
        self.initialized = true;
        self.dirty = true;
        self.save()
    }

    /// True when a setter has modified the shadow since the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Full shadow snapshot.
    pub fn data(&self) -> &ParameterData {
        &self.data
    }

    /// Compose the command station timing configuration from the shadow.
    pub fn timing_config(&self) -> TimingConfig {
        TimingConfig {
            num_preamble: self.data.preamble_bits,
            bit1_duration_us: self.data.bit1_duration_us,
            bit0_duration_us: self.data.bit0_duration_us,
            bidi_enable: self.data.bidi_enable,
            trigger_first_bit: self.data.trigger_first_bit,
            bidi_dac: self.data.bidi_dac,
        }
    }

    /// Track voltage setpoint in millivolts.
    pub fn track_voltage_mv(&self) -> u16 {
        self.data.track_voltage_mv
    }

    /// Set the track voltage setpoint.
    pub fn set_track_voltage_mv(&mut self, mv: u16) {
        self.data.track_voltage_mv = mv;
        self.dirty = true;
    }

    /// DCC preamble bit count.
    pub fn preamble_bits(&self) -> u8 {
        self.data.preamble_bits
    }

    /// Set the DCC preamble bit count. Values below the NMRA minimum are
    /// stored verbatim; activation rejects them.
    pub fn set_preamble_bits(&mut self, bits: u8) {
        self.data.preamble_bits = bits;
        self.dirty = true;
    }

    /// Logical 1 half-period in microseconds.
    pub fn bit1_duration_us(&self) -> u8 {
        self.data.bit1_duration_us
    }

    /// Set the logical 1 half-period. Out-of-tolerance values are stored
    /// verbatim; the engine emits them as-is for margin testing.
    pub fn set_bit1_duration_us(&mut self, us: u8) {
        self.data.bit1_duration_us = us;
        self.dirty = true;
    }

    /// Logical 0 half-period in microseconds.
    pub fn bit0_duration_us(&self) -> u8 {
        self.data.bit0_duration_us
    }

    /// Set the logical 0 half-period (clamped to the u8 runtime range by the
    /// type).
    pub fn set_bit0_duration_us(&mut self, us: u8) {
        self.data.bit0_duration_us = us;
        self.dirty = true;
    }

    /// BiDi cutout enabled.
    pub fn bidi_enable(&self) -> bool {
        self.data.bidi_enable
    }

    /// Enable or disable the BiDi cutout.
    pub fn set_bidi_enable(&mut self, enable: bool) {
        self.data.bidi_enable = enable;
        self.dirty = true;
    }

    /// Scope trigger on each packet's first bit.
    pub fn trigger_first_bit(&self) -> bool {
        self.data.trigger_first_bit
    }

    /// Enable or disable the scope trigger.
    pub fn set_trigger_first_bit(&mut self, enable: bool) {
        self.data.trigger_first_bit = enable;
        self.dirty = true;
    }

    /// BiDi comparator threshold (12-bit DAC value).
    pub fn bidi_dac(&self) -> u16 {
        self.data.bidi_dac
    }

    /// Set the BiDi comparator threshold.
    pub fn set_bidi_dac(&mut self, value: u16) {
        self.data.bidi_dac = value & 0x0FFF;
        self.dirty = true;
    }

    /// Access the owned flash device (test inspection).
    #[cfg(any(test, feature = "mock"))]
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockFlash;

    fn manager() -> ParameterManager<MockFlash> {
        let mut pm = ParameterManager::new(MockFlash::new());
        pm.init(false).unwrap();
        pm
    }

    #[test]
    fn init_on_blank_flash_uses_defaults() {
        let pm = manager();
        assert_eq!(*pm.data(), ParameterData::defaults());
        assert!(!pm.is_dirty());
    }

    #[test]
    fn setters_mark_dirty_without_saving() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        assert!(pm.is_dirty());
        assert_eq!(pm.preamble_bits(), 20);

        // Nothing hit the flash: a fresh restore still fails with the erased
        // sector's magic.
        assert_eq!(pm.restore(), Err(ParamError::MagicMismatch));
    }

    #[test]
    fn save_restore_roundtrip() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.set_bit1_duration_us(61);
        pm.set_bit0_duration_us(116);
        pm.set_bidi_enable(true);
        pm.set_trigger_first_bit(true);
        pm.set_bidi_dac(1234);
        pm.set_track_voltage_mv(18_000);
        pm.save().unwrap();
        assert!(!pm.is_dirty());

        let saved = *pm.data();

        // Scribble over the shadow, then restore.
        pm.set_preamble_bits(14);
        pm.set_bidi_dac(0);
        pm.restore().unwrap();
        assert_eq!(*pm.data(), saved);
        assert_eq!(pm.timing_config().num_preamble, 20);
    }

    #[test]
    fn crc_rejects_any_payload_bit_flip() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.save().unwrap();

        // Flip one bit in several payload positions; each must trip the CRC.
        for &(offset, bit) in &[(0u32, 0u8), (4, 3), (100, 7), (511, 1)] {
            pm.flash_mut().flip_bit(16 + offset, bit);
            assert_eq!(pm.restore(), Err(ParamError::CrcMismatch));
            // Undo for the next round.
            pm.flash_mut().flip_bit(16 + offset, bit);
            assert!(pm.restore().is_ok());
        }
    }

    #[test]
    fn magic_version_size_checked_in_order() {
        let mut pm = manager();
        pm.save().unwrap();

        pm.flash_mut().flip_bit(0, 0);
        assert_eq!(pm.restore(), Err(ParamError::MagicMismatch));
        pm.flash_mut().flip_bit(0, 0);

        pm.flash_mut().flip_bit(4, 1);
        assert_eq!(pm.restore(), Err(ParamError::VersionMismatch));
        pm.flash_mut().flip_bit(4, 1);

        pm.flash_mut().flip_bit(12, 0);
        assert_eq!(pm.restore(), Err(ParamError::SizeMismatch));
        pm.flash_mut().flip_bit(12, 0);

        assert!(pm.restore().is_ok());
    }

    #[test]
    fn failed_restore_leaves_shadow_unchanged() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.save().unwrap();
        pm.flash_mut().inject_corruption(16, 8);

        pm.set_preamble_bits(22);
        assert!(pm.restore().is_err());
        assert_eq!(pm.preamble_bits(), 22);
    }

    #[test]
    fn interrupted_save_falls_back_to_defaults() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.save().unwrap();

        // A power loss during the next save truncates the block mid-payload;
        // the header including the CRC is already on flash, so the partial
        // payload fails CRC validation and init falls back to defaults.
        pm.set_preamble_bits(33);
        pm.flash_mut().simulate_power_loss();
        pm.save().unwrap();

        pm.init(false).unwrap();
        assert_eq!(*pm.data(), ParameterData::defaults());
    }

    #[test]
    fn factory_reset_persists_defaults() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.save().unwrap();

        pm.factory_reset().unwrap();
        assert_eq!(*pm.data(), ParameterData::defaults());

        // And the flash copy is the defaults too.
        pm.set_preamble_bits(20);
        pm.restore().unwrap();
        assert_eq!(*pm.data(), ParameterData::defaults());
    }

    #[test]
    fn init_force_defaults_ignores_flash() {
        let mut pm = manager();
        pm.set_preamble_bits(20);
        pm.save().unwrap();

        pm.init(true).unwrap();
        assert_eq!(pm.preamble_bits(), ParameterData::defaults().preamble_bits);
    }

    #[test]
    fn payload_layout_roundtrip() {
        let mut data = ParameterData::defaults();
        data.preamble_bits = 99;
        data.user_params = [1, 2, 3];
        data.network_port = 4321;
        let buf = data.to_bytes();
        assert_eq!(ParameterData::from_bytes(&buf), data);
        // Spot-check fixed offsets.
        assert_eq!(buf[OFF_PREAMBLE_BITS], 99);
        assert_eq!(
            u16::from_le_bytes([buf[OFF_NET_PORT], buf[OFF_NET_PORT + 1]]),
            4321
        );
    }
}
