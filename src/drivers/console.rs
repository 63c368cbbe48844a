//! Console Device Interface
//!
//! fd 0 and fd 1 of every process are wired to the system console rather
//! than to the storage engine. The device itself (serial port, VGA,
//! keyboard) is outside this crate.
//!
//! # Output Policy
//! Output is handed to the device in bursts of at most `chunk` bytes, so
//! the driver never receives an unbounded buffer and lines written by
//! different processes interleave at burst granularity at worst.

/// Console character device.
pub trait Console: Send + Sync {
    /// Write bytes to the console output.
    fn put_bytes(&self, bytes: &[u8]);

    /// Block until one byte of keyboard input is available.
    fn get_byte(&self) -> u8;
}

/// Write `bytes` to `console` in bursts of at most `chunk` bytes.
///
/// Returns the number of bytes written, always `bytes.len()`.
pub fn write_chunked(console: &dyn Console, bytes: &[u8], chunk: usize) -> usize {
    for burst in bytes.chunks(chunk.max(1)) {
        console.put_bytes(burst);
    }
    bytes.len()
}

/// Fill `buf` from console input, one byte at a time.
pub fn read_exact(console: &dyn Console, buf: &mut [u8]) -> usize {
    for byte in buf.iter_mut() {
        *byte = console.get_byte();
    }
    buf.len()
}
