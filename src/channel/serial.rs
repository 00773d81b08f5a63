//! Real serial port behind the [`SerialChannel`] trait.
//!
//! The `serialport` crate is synchronous, so every call runs inside
//! `tokio::task::spawn_blocking` with the port behind an async mutex,
//! keeping the executor free while the OS driver blocks.

use std::io::{self, Read, Write};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serialport::SerialPort;
use tokio::sync::Mutex;

use crate::channel::SerialChannel;
use crate::config::SerialSettings;
use crate::error::AtResult;

/// A physical serial port speaking to the radio module.
pub struct SerialPortChannel {
    port_name: String,
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialPortChannel {
    /// Open the port described by `settings`.
    pub fn open(settings: &SerialSettings) -> AtResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(io::Error::other)?;

        debug!(
            "Serial port '{}' opened at {} baud",
            settings.port, settings.baud_rate
        );

        Ok(Self {
            port_name: settings.port.clone(),
            port: Arc::new(Mutex::new(port)),
        })
    }

    /// OS device path this channel is attached to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn join_error(err: tokio::task::JoinError) -> io::Error {
    io::Error::other(format!("serial I/O task panicked: {err}"))
}

#[async_trait]
impl SerialChannel for SerialPortChannel {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            guard.write_all(&bytes)?;
            guard.flush()
        })
        .await
        .map_err(join_error)?
    }

    async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            if guard.bytes_to_read().map_err(io::Error::other)? == 0 {
                return Ok(None);
            }
            let mut buf = [0u8; 1];
            match guard.read(&mut buf) {
                Ok(1) => Ok(Some(buf[0])),
                Ok(_) => Ok(None),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn bytes_available(&mut self) -> io::Result<usize> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let guard = port.blocking_lock();
            guard
                .bytes_to_read()
                .map(|n| n as usize)
                .map_err(io::Error::other)
        })
        .await
        .map_err(join_error)?
    }

    async fn clear_input(&mut self) -> io::Result<()> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let guard = port.blocking_lock();
            guard
                .clear(serialport::ClearBuffer::Input)
                .map_err(io::Error::other)
        })
        .await
        .map_err(join_error)?
    }
}
