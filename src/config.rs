//! Settings for the transport loop and the serial link.
//!
//! Both structs deserialize from TOML with `serde`, using humantime strings
//! for durations, and fall back to the documented defaults when a field is
//! omitted.
//!
//! # Example
//!
//! ```toml
//! [transport]
//! line_timeout = "2s"
//! poll_backoff = "400ms"
//! poll_interval = "10ms"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! read_timeout = "50ms"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the command execution loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Deadline for reading one complete response line.
    #[serde(with = "humantime_serde", default = "default_line_timeout")]
    pub line_timeout: Duration,
    /// Pause between polling rounds while no matching line has arrived.
    #[serde(with = "humantime_serde", default = "default_poll_backoff")]
    pub poll_backoff: Duration,
    /// Pause between byte reads while a line is in progress but the
    /// channel is momentarily dry.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            line_timeout: default_line_timeout(),
            poll_backoff: default_poll_backoff(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_line_timeout() -> Duration {
    Duration::from_millis(2000)
}

fn default_poll_backoff() -> Duration {
    Duration::from_millis(400)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

/// Connection parameters for the physical serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// OS device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Line speed in baud. The LoRa-E5 ships at 9600.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Timeout handed to the OS driver for a single blocking read call.
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout() -> Duration {
    Duration::from_millis(50)
}
