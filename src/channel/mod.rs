//! Serial channel implementations.
//!
//! This module defines the [`SerialChannel`] trait, the transport's sole
//! interface to the underlying peripheral, and its two implementations: a
//! real serial port (feature `serial`) and an in-memory scripted channel
//! for tests and demos.

use async_trait::async_trait;

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use mock::MockChannel;
#[cfg(feature = "serial")]
pub use serial::SerialPortChannel;

/// Byte-level access to the radio module.
///
/// The transport owns its channel exclusively and issues one operation at
/// a time, so implementations need no internal command serialization;
/// they only make each individual call safe.
#[async_trait]
pub trait SerialChannel: Send {
    /// Transmit `bytes` fully.
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Take one byte from the receive buffer, or `None` if it is empty.
    ///
    /// Must not block waiting for data; pacing is the caller's job.
    async fn read_byte(&mut self) -> std::io::Result<Option<u8>>;

    /// Number of received bytes waiting to be read.
    async fn bytes_available(&mut self) -> std::io::Result<usize>;

    /// Discard everything currently in the receive buffer.
    async fn clear_input(&mut self) -> std::io::Result<()>;
}
