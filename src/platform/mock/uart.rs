//! Mock UART implementation for testing
//!
//! Provides in-memory buffers for transmit and receive data, allowing tests
//! to verify UART traffic without hardware.

use crate::platform::{traits::UartInterface, Result};
use alloc::vec::Vec;

/// Mock UART
///
/// ```
/// use dcc_teststand::platform::mock::MockUart;
/// use dcc_teststand::platform::traits::UartInterface;
///
/// let mut uart = MockUart::new();
/// uart.write(b"ping").unwrap();
/// assert_eq!(uart.tx_data(), b"ping");
///
/// uart.inject_rx_data(b"pong");
/// let mut buf = [0u8; 4];
/// assert_eq!(uart.read(&mut buf).unwrap(), 4);
/// assert_eq!(&buf, b"pong");
/// ```
#[derive(Debug, Default)]
pub struct MockUart {
    tx: Vec<u8>,
    rx: Vec<u8>,
}

impl MockUart {
    /// Create a new mock UART with empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all transmitted data (for test verification)
    pub fn tx_data(&self) -> &[u8] {
        &self.tx
    }

    /// Clear the transmit capture buffer
    pub fn clear_tx(&mut self) {
        self.tx.clear();
    }

    /// Inject receive data (for test setup)
    pub fn inject_rx_data(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }
}

impl UartInterface for MockUart {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.tx.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let to_read = buffer.len().min(self.rx.len());
        buffer[..to_read].copy_from_slice(&self.rx[..to_read]);
        self.rx.drain(..to_read);
        Ok(to_read)
    }

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_reads_drain_in_order() {
        let mut uart = MockUart::new();
        uart.inject_rx_data(b"Test Data");

        let mut buffer = [0u8; 4];
        assert_eq!(uart.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"Test");

        let mut rest = [0u8; 10];
        assert_eq!(uart.read(&mut rest).unwrap(), 5);
        assert_eq!(&rest[..5], b" Data");
        assert!(!uart.available());
    }
}
