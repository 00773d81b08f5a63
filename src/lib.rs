//! AT-command transport and driver for the Seeed LoRa-E5 radio module.
//!
//! The crate is layered the way the protocol is: a [`channel`] carries raw
//! bytes, the [`line_reader`] frames them into `+`-marked response lines,
//! the [`transport`] executes one command at a time against an immutable
//! [`command`] table, and the [`lora`] driver puts a typed API over the
//! module's command set.
//!
//! # Example
//!
//! ```no_run
//! use lora_at::channel::SerialPortChannel;
//! use lora_at::config::SerialSettings;
//! use lora_at::lora::{DeviceIdentity, LoRaE5};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let channel = SerialPortChannel::open(&SerialSettings {
//!         port: "/dev/ttyUSB0".into(),
//!         baud_rate: 9600,
//!         read_timeout: std::time::Duration::from_millis(50),
//!     })?;
//!
//!     let mut lora = LoRaE5::new(channel)?;
//!     lora.init().await?;
//!     lora.set_identity(&DeviceIdentity {
//!         dev_addr: "00 00 00 00".into(),
//!         app_eui: "48 83 C7 DF 30 06 00 00".into(),
//!         app_key: "71 A4 36 4B 48 45 03 5D D7 8A 4E D8 AC 7F 90 17".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!     lora.join().await?;
//!     let downlink = lora.send_string("hello", 8).await?;
//!     println!("downlink: {downlink:?}");
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod line_reader;
pub mod lora;
pub mod response;
pub mod transport;

pub use channel::{MockChannel, SerialChannel};
#[cfg(feature = "serial")]
pub use channel::SerialPortChannel;
pub use command::{
    CommandDescriptor, CommandParam, CommandTable, CommandTableBuilder, ResponsePattern,
};
pub use config::{SerialSettings, TransportSettings};
pub use error::{AtError, AtResult};
pub use line_reader::{LineReader, ReadOutcome};
pub use lora::LoRaE5;
pub use transport::CommandTransport;
