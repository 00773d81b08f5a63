//! Seeed LoRa-E5 device driver.
//!
//! [`LoRaE5`] layers typed operations over the command transport: network
//! identity and join, uplink with optional downlink extraction, RX window
//! delays, duty cycle and public network flags, device class, DFU, RTC,
//! battery level, firmware version, temperature, and low-power mode.
//!
//! The driver owns the session state the transport deliberately does not
//! track (joined, low-power) and all response parsing. Field extraction
//! follows the module's `+TAG: value` convention; the raw response text is
//! included in every parse error.
//!
//! ```no_run
//! use lora_at::channel::SerialPortChannel;
//! use lora_at::config::SerialSettings;
//! use lora_at::lora::LoRaE5;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let channel = SerialPortChannel::open(&SerialSettings {
//!     port: "/dev/ttyUSB0".into(),
//!     baud_rate: 9600,
//!     read_timeout: std::time::Duration::from_millis(50),
//! })?;
//! let mut lora = LoRaE5::new(channel)?;
//! lora.init().await?;
//! lora.join().await?;
//! if let Some(downlink) = lora.send_string("hello", 8).await? {
//!     println!("downlink on port {}: {:?}", downlink.port, downlink.payload);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::channel::SerialChannel;
use crate::command::{CommandDescriptor, CommandParam, CommandTable};
use crate::config::TransportSettings;
use crate::error::AtResult;
use crate::transport::CommandTransport;

/// Identifiers of the built-in command table.
pub mod ids {
    /// Ping (`AT`).
    pub const AT: &str = "at";
    /// Device identity registers (`AT+ID`).
    pub const ID: &str = "id";
    /// Network keys (`AT+KEY`).
    pub const KEY: &str = "key";
    /// OTAA join (`AT+JOIN`).
    pub const JOIN: &str = "join";
    /// Activation mode (`AT+MODE`).
    pub const MODE: &str = "mode";
    /// Unconfirmed string uplink (`AT+MSG`).
    pub const MSG: &str = "msg";
    /// Confirmed string uplink (`AT+CMSG`).
    pub const CMSG: &str = "cmsg";
    /// Unconfirmed binary uplink (`AT+MSGHEX`).
    pub const MSGHEX: &str = "msghex";
    /// Confirmed binary uplink (`AT+CMSGHEX`).
    pub const CMSGHEX: &str = "cmsghex";
    /// Uplink port (`AT+PORT`).
    pub const PORT: &str = "port";
    /// Software reset (`AT+RESET`).
    pub const RESET: &str = "reset";
    /// Factory defaults (`AT+FDEFAULT`).
    pub const FACTORY_DEFAULT: &str = "fdefault";
    /// Firmware upgrade mode (`AT+DFU`).
    pub const DFU: &str = "dfu";
    /// Device class (`AT+CLASS`).
    pub const CLASS: &str = "class";
    /// One RX window delay (`AT+DELAY`).
    pub const DELAY: &str = "delay";
    /// All four RX window delays; completion on the final `JRX2` line.
    pub const DELAY_ALL: &str = "delay.all";
    /// Data rate / region scheme (`AT+DR`).
    pub const DATA_RATE: &str = "dr";
    /// LoRaWAN stack options (`AT+LW`).
    pub const LW: &str = "lw";
    /// Duty cycle option; completion on the `+LW: DC` line.
    pub const LW_DUTY_CYCLE: &str = "lw.dc";
    /// Battery option; completion on the `+LW: BAT` line.
    pub const LW_BATTERY: &str = "lw.bat";
    /// Version option; completion on the `+LW: VER` line.
    pub const LW_VERSION: &str = "lw.ver";
    /// Temperature sensor (`AT+TEMP`).
    pub const TEMP: &str = "temp";
    /// Real-time clock (`AT+RTC`).
    pub const RTC: &str = "rtc";
    /// Enter sleep (`AT+LOWPOWER`).
    pub const LOW_POWER: &str = "lowpower";
    /// Wake from sleep; any byte does, `0` by convention.
    pub const WAKE: &str = "wake";
}

/// Ping attempts [`LoRaE5::init`] makes after a reset.
const INIT_PING_ATTEMPTS: u32 = 5;

/// The built-in table covering the module's command set.
///
/// Timeouts follow the module's documented worst cases: join and uplink
/// wait out the full RX windows (20 s), everything else answers within
/// the default.
pub fn command_table() -> AtResult<CommandTable> {
    let long = Duration::from_secs(20);
    CommandTable::builder()
        .command(CommandDescriptor::expect(ids::AT, "AT", "+AT: OK"))
        .command(CommandDescriptor::expect(ids::ID, "AT+ID", "+ID"))
        .command(CommandDescriptor::expect(ids::KEY, "AT+KEY", "+KEY"))
        .command(CommandDescriptor::expect(ids::JOIN, "AT+JOIN", "+JOIN: Done").with_timeout(long))
        .command(
            CommandDescriptor::expect(ids::MODE, "AT+MODE", "+MODE")
                .with_timeout(Duration::from_secs(3)),
        )
        .command(
            CommandDescriptor::expect_any(ids::MSG, "AT+MSG", ["+MSG: Done", "+MSG: PORT"])
                .with_timeout(long),
        )
        .command(
            CommandDescriptor::expect_any(ids::CMSG, "AT+CMSG", ["+CMSG: Done", "+CMSG: PORT"])
                .with_timeout(long),
        )
        .command(
            CommandDescriptor::expect_any(
                ids::MSGHEX,
                "AT+MSGHEX",
                ["+MSGHEX: Done", "+MSGHEX: PORT"],
            )
            .with_timeout(long),
        )
        .command(
            CommandDescriptor::expect_any(
                ids::CMSGHEX,
                "AT+CMSGHEX",
                ["+CMSGHEX: Done", "+CMSGHEX: PORT"],
            )
            .with_timeout(long),
        )
        .command(CommandDescriptor::expect(ids::PORT, "AT+PORT", "+PORT:"))
        .command(CommandDescriptor::expect(ids::RESET, "AT+RESET", "+RESET:"))
        .command(CommandDescriptor::expect(
            ids::FACTORY_DEFAULT,
            "AT+FDEFAULT",
            "+FDEFAULT:",
        ))
        .command(CommandDescriptor::expect(ids::DFU, "AT+DFU", "+DFU:"))
        .command(CommandDescriptor::expect(ids::CLASS, "AT+CLASS", "+CLASS:"))
        .command(CommandDescriptor::expect(ids::DELAY, "AT+DELAY", "+DELAY:"))
        .command(CommandDescriptor::expect(ids::DELAY_ALL, "AT+DELAY", "JRX2"))
        .command(CommandDescriptor::expect(ids::DATA_RATE, "AT+DR", "+DR:"))
        .command(CommandDescriptor::expect(ids::LW, "AT+LW", "+LW:"))
        .command(CommandDescriptor::expect(ids::LW_DUTY_CYCLE, "AT+LW", "+LW: DC"))
        .command(CommandDescriptor::expect(ids::LW_BATTERY, "AT+LW", "+LW: BAT"))
        .command(CommandDescriptor::expect(ids::LW_VERSION, "AT+LW", "+LW: VER"))
        .command(CommandDescriptor::expect(ids::TEMP, "AT+TEMP", "+TEMP:"))
        .command(CommandDescriptor::expect(ids::RTC, "AT+RTC", "+RTC:"))
        .command(CommandDescriptor::expect(
            ids::LOW_POWER,
            "AT+LOWPOWER",
            "+LOWPOWER:",
        ))
        .command(
            CommandDescriptor::expect(ids::WAKE, "0", "+LOWPOWER:")
                .with_timeout(Duration::from_secs(2)),
        )
        .build()
}

/// LoRaWAN activation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Activation by personalization.
    Abp,
    /// Over-the-air activation.
    Otaa,
    /// RF test mode.
    Test,
}

impl Mode {
    /// The token the module uses on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Abp => "LWABP",
            Mode::Otaa => "LWOTAA",
            Mode::Test => "TEST",
        }
    }
}

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Class A, RX windows only after an uplink.
    A,
    /// Class B, scheduled RX slots.
    B,
    /// Class C, continuous RX.
    C,
}

impl DeviceClass {
    /// The token the module uses on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::A => "A",
            DeviceClass::B => "B",
            DeviceClass::C => "C",
        }
    }
}

/// Identity and key material to program into the module.
///
/// Addresses, EUIs and keys use the module's space- or colon-separated
/// hex-octet notation, e.g. `"2C F7 F1 20 32 30 AA BB"`.
#[derive(Debug, Clone, Default)]
pub struct DeviceIdentity {
    /// Device address.
    pub dev_addr: String,
    /// Device EUI; left unchanged when `None`.
    pub dev_eui: Option<String>,
    /// Application EUI.
    pub app_eui: String,
    /// OTAA application key.
    pub app_key: String,
    /// ABP application session key; left unchanged when `None`.
    pub app_skey: Option<String>,
    /// ABP network session key; left unchanged when `None`.
    pub nwk_skey: Option<String>,
}

/// Identity currently held by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIdentity {
    /// Device address, space-separated hex octets.
    pub dev_addr: String,
    /// Device EUI, space-separated hex octets.
    pub dev_eui: String,
    /// Application EUI, space-separated hex octets.
    pub app_eui: String,
}

/// The four RX window delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxWindowDelays {
    /// RX1 delay during the join procedure.
    pub join_rx1: Duration,
    /// RX2 delay during the join procedure.
    pub join_rx2: Duration,
    /// RX1 delay after an uplink.
    pub rx1: Duration,
    /// RX2 delay after an uplink.
    pub rx2: Duration,
}

impl Default for RxWindowDelays {
    fn default() -> Self {
        Self {
            join_rx1: Duration::from_millis(5000),
            join_rx2: Duration::from_millis(6000),
            rx1: Duration::from_millis(1000),
            rx2: Duration::from_millis(2000),
        }
    }
}

/// Data the network pushed down in an uplink's RX window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Port the downlink arrived on.
    pub port: u8,
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
}

static DOWNLINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"PORT:\s*(\d+);\s*RX:\s*"([0-9A-Fa-f]*)""#).expect("Invalid downlink regex")
});
static DELAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+DELAY:\s*(JRX1|JRX2|RX1|RX2),\s*(\d+)").expect("Invalid delay regex")
});
static RTC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)-(\d+)-(\d+)\s+(\d+):(\d+):(\d+)").expect("Invalid RTC regex")
});
static TEMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+TEMP:\s*(-?\d+(?:\.\d+)?)").expect("Invalid temperature regex"));
static DFU_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+DFU:\s*(ON|OFF)").expect("Invalid DFU regex"));
static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+CLASS:\s*([ABC])").expect("Invalid class regex"));
static DUTY_CYCLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DC,\s*(ON|OFF)(?:,\s*(\d+))?").expect("Invalid duty cycle regex"));
static NET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"NET,\s*(ON|OFF)").expect("Invalid network regex"));
static BATTERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BAT,?\s*(\d+)").expect("Invalid battery regex"));
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"VER,?\s*(\S+)").expect("Invalid version regex"));

/// Typed driver for the Seeed LoRa-E5 module.
pub struct LoRaE5<C: SerialChannel> {
    transport: CommandTransport<C>,
    joined: bool,
    low_power: bool,
}

impl<C: SerialChannel> LoRaE5<C> {
    /// Driver over `channel` with the built-in table and default
    /// timings.
    pub fn new(channel: C) -> AtResult<Self> {
        Self::with_settings(channel, &TransportSettings::default())
    }

    /// Driver with explicit transport timings.
    pub fn with_settings(channel: C, settings: &TransportSettings) -> AtResult<Self> {
        let table = std::sync::Arc::new(command_table()?);
        Ok(Self {
            transport: CommandTransport::with_settings(channel, table, settings),
            joined: false,
            low_power: false,
        })
    }

    /// The underlying transport.
    pub fn transport(&self) -> &CommandTransport<C> {
        &self.transport
    }

    /// Mutable access to the underlying transport, for commands outside
    /// the typed surface.
    pub fn transport_mut(&mut self) -> &mut CommandTransport<C> {
        &mut self.transport
    }

    /// True once [`join`] has succeeded.
    ///
    /// [`join`]: LoRaE5::join
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// True while the module sleeps.
    pub fn in_low_power(&self) -> bool {
        self.low_power
    }

    /// Reset the module and ping it until it answers.
    pub async fn init(&mut self) -> Result<()> {
        self.reset().await.context("Failed to reset module")?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.execute(ids::AT, &[]).await {
                Ok(_) => break,
                Err(err) if attempt < INIT_PING_ATTEMPTS => {
                    warn!("Ping attempt {attempt}/{INIT_PING_ATTEMPTS} failed: {err}");
                }
                Err(err) => {
                    return Err(err).context("Module did not answer after reset");
                }
            }
        }
        info!("LoRa-E5 module is responsive");
        Ok(())
    }

    /// Program network identity and keys, then select OTAA mode.
    pub async fn set_identity(&mut self, identity: &DeviceIdentity) -> Result<()> {
        self.set_id_register("DevAddr", &identity.dev_addr)
            .await
            .context("Failed to set DevAddr")?;
        if let Some(dev_eui) = &identity.dev_eui {
            self.set_id_register("DevEui", dev_eui)
                .await
                .context("Failed to set DevEui")?;
        }
        self.set_id_register("AppEui", &identity.app_eui)
            .await
            .context("Failed to set AppEui")?;

        self.set_key_register("APPKEY", &identity.app_key)
            .await
            .context("Failed to set AppKey")?;
        if let Some(app_skey) = &identity.app_skey {
            self.set_key_register("APPSKEY", app_skey)
                .await
                .context("Failed to set AppSKey")?;
        }
        if let Some(nwk_skey) = &identity.nwk_skey {
            self.set_key_register("NWKSKEY", nwk_skey)
                .await
                .context("Failed to set NwkSKey")?;
        }

        self.set_mode(Mode::Otaa)
            .await
            .context("Failed to select OTAA mode")?;
        Ok(())
    }

    async fn set_id_register(&mut self, register: &str, value: &str) -> Result<()> {
        let params = [CommandParam::from(register), CommandParam::quoted(value)];
        self.transport.execute(ids::ID, &params).await?;
        Ok(())
    }

    async fn set_key_register(&mut self, register: &str, value: &str) -> Result<()> {
        let params = [CommandParam::from(register), CommandParam::quoted(value)];
        self.transport.execute(ids::KEY, &params).await?;
        Ok(())
    }

    /// Read the identity registers back from the module.
    pub async fn identity(&mut self) -> Result<ModuleIdentity> {
        Ok(ModuleIdentity {
            dev_addr: self.read_id_register("DevAddr").await?,
            dev_eui: self.read_id_register("DevEui").await?,
            app_eui: self.read_id_register("AppEui").await?,
        })
    }

    async fn read_id_register(&mut self, register: &str) -> Result<String> {
        let params = [CommandParam::from(register)];
        let body = self.transport.execute(ids::ID, &params).await?;
        let text = text(&body);
        let (_, value) = text
            .split_once(&format!("{register},"))
            .with_context(|| format!("Malformed {register} response: '{text}'"))?;
        Ok(value.trim().replace(':', " "))
    }

    /// Join the network over-the-air.
    ///
    /// The module reports `+JOIN: Done` after a failed attempt too; the
    /// body is checked for the failure notice before the flag is set.
    pub async fn join(&mut self) -> Result<()> {
        let body = self
            .transport
            .execute(ids::JOIN, &[])
            .await
            .context("Join exchange failed")?;
        let text = text(&body);
        if text.contains("Join failed") {
            bail!("Network rejected join: '{text}'");
        }
        self.joined = true;
        info!("Joined LoRa network");
        Ok(())
    }

    /// Unconfirmed text uplink. Returns the downlink, if the network sent
    /// one in the RX windows.
    pub async fn send_string(&mut self, payload: &str, port: u8) -> Result<Option<Downlink>> {
        self.send_uplink(ids::MSG, CommandParam::quoted(payload), port)
            .await
    }

    /// Confirmed text uplink.
    pub async fn send_confirmed_string(
        &mut self,
        payload: &str,
        port: u8,
    ) -> Result<Option<Downlink>> {
        self.send_uplink(ids::CMSG, CommandParam::quoted(payload), port)
            .await
    }

    /// Unconfirmed binary uplink.
    pub async fn send_bytes(&mut self, payload: &[u8], port: u8) -> Result<Option<Downlink>> {
        self.send_uplink(ids::MSGHEX, CommandParam::quoted(hex_encode(payload)), port)
            .await
    }

    /// Confirmed binary uplink.
    pub async fn send_confirmed_bytes(
        &mut self,
        payload: &[u8],
        port: u8,
    ) -> Result<Option<Downlink>> {
        self.send_uplink(ids::CMSGHEX, CommandParam::quoted(hex_encode(payload)), port)
            .await
    }

    async fn send_uplink(
        &mut self,
        id: &str,
        payload: CommandParam,
        port: u8,
    ) -> Result<Option<Downlink>> {
        self.set_port(port)
            .await
            .with_context(|| format!("Failed to select port {port}"))?;
        if !self.joined {
            bail!("Not joined to a network; call join() first");
        }

        let body = self
            .transport
            .execute(id, &[payload])
            .await
            .context("Uplink exchange failed")?;
        extract_downlink(&text(&body))
    }

    /// Select the uplink port.
    pub async fn set_port(&mut self, port: u8) -> Result<()> {
        let params = [CommandParam::from(port)];
        self.transport.execute(ids::PORT, &params).await?;
        Ok(())
    }

    /// Software-reset the module. Clears the joined and low-power flags,
    /// since a reboot drops both.
    pub async fn reset(&mut self) -> Result<()> {
        self.transport.execute(ids::RESET, &[]).await?;
        self.joined = false;
        self.low_power = false;
        info!("Module reset");
        Ok(())
    }

    /// Restore factory settings. Clears the session flags like
    /// [`reset`].
    ///
    /// [`reset`]: LoRaE5::reset
    pub async fn factory_reset(&mut self) -> Result<()> {
        self.transport.execute(ids::FACTORY_DEFAULT, &[]).await?;
        self.joined = false;
        self.low_power = false;
        info!("Factory settings restored");
        Ok(())
    }

    /// Enable or disable firmware-upgrade mode.
    pub async fn set_dfu(&mut self, enabled: bool) -> Result<()> {
        let params = [CommandParam::from(on_off(enabled))];
        self.transport.execute(ids::DFU, &params).await?;
        Ok(())
    }

    /// Whether firmware-upgrade mode is enabled.
    pub async fn dfu(&mut self) -> Result<bool> {
        let body = self.transport.query(ids::DFU, &[]).await?;
        let text = text(&body);
        let captures = DFU_RE
            .captures(&text)
            .with_context(|| format!("Malformed DFU response: '{text}'"))?;
        Ok(&captures[1] == "ON")
    }

    /// Select the activation mode.
    pub async fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let params = [CommandParam::from(mode.as_str())];
        self.transport.execute(ids::MODE, &params).await?;
        Ok(())
    }

    /// The current activation mode.
    pub async fn mode(&mut self) -> Result<Mode> {
        let body = self.transport.query(ids::MODE, &[]).await?;
        let text = text(&body).to_ascii_uppercase();
        if text.contains("LWABP") {
            Ok(Mode::Abp)
        } else if text.contains("LWOTAA") {
            Ok(Mode::Otaa)
        } else if text.contains("TEST") {
            Ok(Mode::Test)
        } else {
            Err(anyhow!("Malformed mode response: '{text}'"))
        }
    }

    /// Select the device class.
    pub async fn set_class(&mut self, class: DeviceClass) -> Result<()> {
        let params = [CommandParam::from(class.as_str())];
        self.transport.execute(ids::CLASS, &params).await?;
        Ok(())
    }

    /// The current device class.
    pub async fn device_class(&mut self) -> Result<DeviceClass> {
        let body = self.transport.query(ids::CLASS, &[]).await?;
        let text = text(&body);
        let captures = CLASS_RE
            .captures(&text)
            .with_context(|| format!("Malformed class response: '{text}'"))?;
        Ok(match &captures[1] {
            "A" => DeviceClass::A,
            "B" => DeviceClass::B,
            _ => DeviceClass::C,
        })
    }

    /// Program all four RX window delays.
    pub async fn set_delays(&mut self, delays: &RxWindowDelays) -> Result<()> {
        for (register, value) in [
            ("JRX1", delays.join_rx1),
            ("JRX2", delays.join_rx2),
            ("RX1", delays.rx1),
            ("RX2", delays.rx2),
        ] {
            let params = [
                CommandParam::from(register),
                CommandParam::Int(value.as_millis() as i64),
            ];
            self.transport
                .execute(ids::DELAY, &params)
                .await
                .with_context(|| format!("Failed to set {register} delay"))?;
        }
        Ok(())
    }

    /// Read all four RX window delays.
    ///
    /// The module answers with four lines; the exchange completes on the
    /// final `JRX2` one and the windows are extracted by name from the
    /// accumulated body.
    pub async fn delays(&mut self) -> Result<RxWindowDelays> {
        let body = self.transport.query(ids::DELAY_ALL, &[]).await?;
        let text = text(&body);

        let mut delays = RxWindowDelays::default();
        let mut seen = 0;
        for captures in DELAY_RE.captures_iter(&text) {
            let value = captures[2]
                .parse::<u64>()
                .with_context(|| format!("Malformed delay response: '{text}'"))?;
            let value = Duration::from_millis(value);
            match &captures[1] {
                "JRX1" => delays.join_rx1 = value,
                "JRX2" => delays.join_rx2 = value,
                "RX1" => delays.rx1 = value,
                _ => delays.rx2 = value,
            }
            seen += 1;
        }
        if seen < 4 {
            bail!("Malformed delay response: '{text}'");
        }
        Ok(delays)
    }

    /// Enable duty cycle control with the given maximum (`Some`), or
    /// disable it (`None`).
    pub async fn set_duty_cycle(&mut self, max_duty_cycle: Option<u8>) -> Result<()> {
        let params: Vec<CommandParam> = match max_duty_cycle {
            Some(max) => vec!["DC".into(), "ON".into(), max.into()],
            None => vec!["DC".into(), "OFF".into()],
        };
        self.transport.execute(ids::LW, &params).await?;
        Ok(())
    }

    /// Duty cycle control state: `Some(max)` when enabled, `None` when
    /// off.
    pub async fn duty_cycle(&mut self) -> Result<Option<u8>> {
        let params = [CommandParam::from("DC")];
        let body = self.transport.execute(ids::LW_DUTY_CYCLE, &params).await?;
        let text = text(&body);
        let captures = DUTY_CYCLE_RE
            .captures(&text)
            .with_context(|| format!("Malformed duty cycle response: '{text}'"))?;
        if &captures[1] != "ON" {
            return Ok(None);
        }
        let max = match captures.get(2) {
            Some(m) => m
                .as_str()
                .parse::<u8>()
                .with_context(|| format!("Malformed duty cycle response: '{text}'"))?,
            None => 0,
        };
        Ok(Some(max))
    }

    /// Enable or disable the public-network sync word.
    pub async fn set_public_network(&mut self, enabled: bool) -> Result<()> {
        let params = [CommandParam::from("NET"), CommandParam::from(on_off(enabled))];
        self.transport.execute(ids::LW, &params).await?;
        Ok(())
    }

    /// Whether the public-network sync word is enabled.
    ///
    /// The answer comes from an explicit `ON`/`OFF` token in the
    /// response, never from a bare substring-position test.
    pub async fn public_network(&mut self) -> Result<bool> {
        let params = [CommandParam::from("NET")];
        let body = self.transport.execute(ids::LW, &params).await?;
        let text = text(&body);
        let captures = NET_RE
            .captures(&text)
            .with_context(|| format!("Malformed public network response: '{text}'"))?;
        Ok(&captures[1] == "ON")
    }

    /// Put the module to sleep. No-op when already sleeping.
    pub async fn enter_low_power(&mut self) -> Result<()> {
        if self.low_power {
            return Ok(());
        }
        self.transport.execute(ids::LOW_POWER, &[]).await?;
        self.low_power = true;
        info!("Module entered low-power mode");
        Ok(())
    }

    /// Wake the module from sleep. No-op when already awake.
    ///
    /// The wake command is a throwaway byte; the module acknowledges with
    /// `+LOWPOWER: WAKEUP`, which is required before the flag clears.
    pub async fn wake(&mut self) -> Result<()> {
        if !self.low_power {
            return Ok(());
        }
        let body = self.transport.execute(ids::WAKE, &[]).await?;
        let text = text(&body);
        if !text.to_ascii_uppercase().contains("WAKEUP") {
            bail!("Unexpected wake response: '{text}'");
        }
        self.low_power = false;
        info!("Module woke from low-power mode");
        Ok(())
    }

    /// The active region scheme, e.g. `EU868`.
    pub async fn region(&mut self) -> Result<String> {
        let params = [CommandParam::from("SCHEME")];
        let body = self.transport.execute(ids::DATA_RATE, &params).await?;
        let text = text(&body);
        let region = text
            .rsplit(':')
            .next()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .with_context(|| format!("Malformed region response: '{text}'"))?;
        Ok(region.to_string())
    }

    /// Set the module's real-time clock.
    pub async fn set_rtc(&mut self, timestamp: &NaiveDateTime) -> Result<()> {
        let formatted = timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let params = [CommandParam::quoted(formatted)];
        self.transport.execute(ids::RTC, &params).await?;
        Ok(())
    }

    /// Read the module's real-time clock.
    pub async fn rtc(&mut self) -> Result<NaiveDateTime> {
        let body = self.transport.query(ids::RTC, &[]).await?;
        let text = text(&body);
        let captures = RTC_RE
            .captures(&text)
            .with_context(|| format!("Malformed RTC response: '{text}'"))?;

        let field = |i: usize| -> Result<u32> {
            captures[i]
                .parse::<u32>()
                .with_context(|| format!("Malformed RTC response: '{text}'"))
        };
        let year = captures[1]
            .parse::<i32>()
            .with_context(|| format!("Malformed RTC response: '{text}'"))?;
        let (month, day) = (field(2)?, field(3)?);
        let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);

        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .ok_or_else(|| anyhow!("Out-of-range RTC timestamp: '{text}'"))
    }

    /// Report the battery level to the LoRaWAN stack (0-255).
    pub async fn set_battery_level(&mut self, level: u8) -> Result<()> {
        let params = [CommandParam::from("BAT"), CommandParam::from(level)];
        self.transport.execute(ids::LW, &params).await?;
        Ok(())
    }

    /// The battery level the stack currently reports (0-255).
    pub async fn battery_level(&mut self) -> Result<u8> {
        let params = [CommandParam::from("BAT")];
        let body = self.transport.execute(ids::LW_BATTERY, &params).await?;
        let text = text(&body);
        let captures = BATTERY_RE
            .captures(&text)
            .with_context(|| format!("Malformed battery response: '{text}'"))?;
        captures[1]
            .parse::<u8>()
            .with_context(|| format!("Malformed battery response: '{text}'"))
    }

    /// The full firmware version string, e.g. `4.0.11`.
    pub async fn version(&mut self) -> Result<String> {
        let params = [CommandParam::from("VER")];
        let body = self.transport.execute(ids::LW_VERSION, &params).await?;
        let text = text(&body);
        let captures = VERSION_RE
            .captures(&text)
            .with_context(|| format!("Malformed version response: '{text}'"))?;
        Ok(captures[1].to_string())
    }

    /// The module's temperature in degrees Celsius.
    pub async fn temperature(&mut self) -> Result<f64> {
        let body = self.transport.query(ids::TEMP, &[]).await?;
        let text = text(&body);
        let captures = TEMP_RE
            .captures(&text)
            .with_context(|| format!("Malformed temperature response: '{text}'"))?;
        captures[1]
            .parse::<f64>()
            .with_context(|| format!("Malformed temperature response: '{text}'"))
    }
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

/// Pull the downlink out of an uplink response, if the network sent one.
fn extract_downlink(text: &str) -> Result<Option<Downlink>> {
    let Some(captures) = DOWNLINK_RE.captures(text) else {
        return Ok(None);
    };
    let port = captures[1]
        .parse::<u8>()
        .with_context(|| format!("Malformed downlink port: '{text}'"))?;
    let payload = hex_decode(&captures[2])
        .with_context(|| format!("Malformed downlink payload: '{text}'"))?;
    Ok(Some(Downlink { port, payload }))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn hex_decode(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("Odd-length hex string: '{hex}'");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte in '{hex}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_table_is_complete() {
        let table = command_table().unwrap();
        assert_eq!(table.len(), 25);
        assert_eq!(table.lookup(ids::JOIN).unwrap().timeout, Duration::from_secs(20));
        assert_eq!(table.lookup(ids::WAKE).unwrap().literal, "0");
        assert_eq!(
            table.lookup(ids::MSG).unwrap().pattern.as_ref().unwrap().alternatives(),
            ["+MSG: Done".to_string(), "+MSG: PORT".to_string()]
        );
    }

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(hex_encode(&[0x05, 0xAB, 0x00]), "05AB00");
        assert_eq!(hex_decode("05AB00").unwrap(), vec![0x05, 0xAB, 0x00]);
        assert!(hex_decode("0G").is_err());
        assert!(hex_decode("123").is_err());
    }

    #[test]
    fn test_extract_downlink() {
        let body = "+CMSG: Start+CMSG: FPENDING+CMSG: PORT: 5; RX: \"05AB0A\"+CMSG: Done";
        let downlink = extract_downlink(body).unwrap().unwrap();
        assert_eq!(downlink.port, 5);
        assert_eq!(downlink.payload, vec![0x05, 0xAB, 0x0A]);
    }

    #[test]
    fn test_extract_downlink_absent() {
        assert_eq!(extract_downlink("+MSG: Done").unwrap(), None);
    }

    #[test]
    fn test_extract_downlink_accepts_hex_letters() {
        // Payloads are hex, not decimal; letter digits must be kept
        let body = "+MSG: PORT: 10; RX: \"FF\"";
        let downlink = extract_downlink(body).unwrap().unwrap();
        assert_eq!(downlink.payload, vec![0xFF]);
    }

    #[test]
    fn test_delay_regex_extracts_all_windows() {
        let body = "+DELAY: RX1, 1000+DELAY: RX2, 2000+DELAY: JRX1, 5000+DELAY: JRX2, 6000";
        let pairs: Vec<(String, String)> = DELAY_RE
            .captures_iter(body)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[2], ("JRX1".to_string(), "5000".to_string()));
    }

    #[test]
    fn test_rtc_regex() {
        let captures = RTC_RE.captures("+RTC: 2026-08-25 14:03:09").unwrap();
        assert_eq!(&captures[1], "2026");
        assert_eq!(&captures[6], "09");
    }

    #[test]
    fn test_temperature_regex_handles_negatives() {
        let captures = TEMP_RE.captures("+TEMP: -10.3").unwrap();
        assert_eq!(&captures[1], "-10.3");
        let captures = TEMP_RE.captures("+TEMP: 21").unwrap();
        assert_eq!(&captures[1], "21");
    }

    #[test]
    fn test_duty_cycle_regex() {
        let captures = DUTY_CYCLE_RE.captures("+LW: DC, ON, 2").unwrap();
        assert_eq!(&captures[1], "ON");
        assert_eq!(captures.get(2).unwrap().as_str(), "2");

        let captures = DUTY_CYCLE_RE.captures("+LW: DC, OFF").unwrap();
        assert_eq!(&captures[1], "OFF");
        assert!(captures.get(2).is_none());
    }

    #[test]
    fn test_mode_tokens() {
        assert_eq!(Mode::Otaa.as_str(), "LWOTAA");
        assert_eq!(Mode::Abp.as_str(), "LWABP");
        assert_eq!(DeviceClass::C.as_str(), "C");
    }
}
