/// Byte-level link to a serial UHF module.
/// Implement this trait for different transports (serial port, UART, etc.)
pub trait ByteLink {
    /// Error type for link operations
    type Error: std::fmt::Debug;

    /// Write data to the link
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read data from the link with a timeout in milliseconds
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Clear the input buffer
    fn clear_input(&mut self) -> Result<(), Self::Error>;
}
