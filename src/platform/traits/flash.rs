//! Flash interface trait
//!
//! Defines the persistent storage interface used by the parameter manager.

use crate::platform::Result;

/// Flash interface trait
///
/// # Safety Invariants
///
/// - Erase granularity is one sector; `erase` addresses and sizes must be
///   sector-aligned
/// - Writes may only clear bits (1 -> 0); a sector must be erased before it
///   is reprogrammed
/// - Only one owner writes the device (the parameter manager); concurrent
///   writes are a programming error
pub trait FlashInterface {
    /// Read `buf.len()` bytes starting at `address`.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()>;

    /// Program `data` starting at `address`.
    ///
    /// The target range must have been erased; programming can only clear
    /// bits.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<()>;

    /// Erase `size` bytes starting at `address`.
    ///
    /// Both must be multiples of [`FlashInterface::sector_size`].
    fn erase(&mut self, address: u32, size: u32) -> Result<()>;

    /// Erase sector size in bytes.
    fn sector_size(&self) -> u32;

    /// Total device capacity in bytes.
    fn capacity(&self) -> u32;
}
