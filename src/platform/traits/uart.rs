//! UART interface trait

use crate::platform::Result;

/// UART interface trait
///
/// Non-blocking byte-stream access. `read` returns however many bytes are
/// currently buffered (possibly zero); `write` queues the full slice.
///
/// # Safety Invariants
///
/// - One owner per port instance; the RPC transport and the BiDi transmitter
///   use separate ports
pub trait UartInterface {
    /// Queue `data` for transmission. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Drain buffered receive data into `buffer`. Returns the byte count,
    /// zero when nothing is pending.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// True when receive data is pending.
    fn available(&self) -> bool;
}
