//! Smoke tests against a real LoRa-E5 module.
//!
//! These tests require a module wired to a serial port; they reset it and
//! read a few registers, but never transmit on the radio. Select the port
//! with `LORA_PORT` (default `/dev/ttyUSB0`), then run:
//!
//! ```bash
//! cargo test --test hardware_test -- --ignored --nocapture --test-threads=1
//! ```

#![cfg(feature = "serial")]

use std::time::Duration;

use lora_at::config::SerialSettings;
use lora_at::lora::LoRaE5;
use lora_at::SerialPortChannel;

fn settings() -> SerialSettings {
    SerialSettings {
        port: std::env::var("LORA_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string()),
        baud_rate: 9600,
        read_timeout: Duration::from_millis(50),
    }
}

async fn connect() -> LoRaE5<SerialPortChannel> {
    let channel = SerialPortChannel::open(&settings()).expect("Failed to open serial port");
    let mut lora = LoRaE5::new(channel).expect("Failed to build driver");
    lora.init().await.expect("Module did not answer after reset");
    lora
}

#[tokio::test]
#[ignore] // Hardware-only test
async fn module_reports_its_firmware_version() {
    let mut lora = connect().await;

    let version = lora.version().await.expect("Version query failed");
    println!("Firmware version: {version}");
    assert!(!version.is_empty());
}

#[tokio::test]
#[ignore]
async fn identity_registers_are_readable() {
    let mut lora = connect().await;

    let identity = lora.identity().await.expect("Identity query failed");
    println!("DevAddr: {}", identity.dev_addr);
    println!("DevEui:  {}", identity.dev_eui);
    println!("AppEui:  {}", identity.app_eui);
    assert!(!identity.dev_eui.is_empty());
}

#[tokio::test]
#[ignore]
async fn temperature_reads_a_plausible_value() {
    let mut lora = connect().await;

    let celsius = lora.temperature().await.expect("Temperature query failed");
    println!("Module temperature: {celsius} C");
    // STM32WLE5 operating range
    assert!((-40.0..=85.0).contains(&celsius));
}

#[tokio::test]
#[ignore]
async fn low_power_round_trip() {
    let mut lora = connect().await;

    lora.enter_low_power().await.expect("Sleep command failed");
    assert!(lora.in_low_power());

    lora.wake().await.expect("Wake command failed");
    assert!(!lora.in_low_power());

    // Still responsive after the round trip
    lora.version().await.expect("Module unresponsive after wake");
}
