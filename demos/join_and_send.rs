// End-to-end walk through the driver against a scripted channel.
// Runs without hardware; swap in SerialPortChannel::open for a real module.

use lora_at::lora::{DeviceIdentity, LoRaE5};
use lora_at::MockChannel;

fn script_module_replies(script: &MockChannel) {
    // One reply per command the demo sends, in order
    script.enqueue_reply(b"+RESET: OK\r\n");
    script.enqueue_reply(b"+AT: OK\r\n");
    script.enqueue_reply(b"+ID: DevAddr, 32:30:AA:BB\r\n");
    script.enqueue_reply(b"+ID: AppEui, 48:83:C7:DF:30:06:00:00\r\n");
    script.enqueue_reply(b"+KEY: APPKEY 71A4364B4845035DD78A4ED8AC7F9017\r\n");
    script.enqueue_reply(b"+MODE: LWOTAA\r\n");
    script.enqueue_reply(
        b"+JOIN: Network joined\r\n+JOIN: NetID 000024, DevAddr 48:00:00:01\r\n+JOIN: Done\r\n",
    );
    script.enqueue_reply(b"+PORT: 8\r\n");
    script.enqueue_reply(
        b"+CMSG: Start\r\n+CMSG: Wait ACK\r\n+CMSG: ACK Received\r\n\
          +CMSG: PORT: 5; RX: \"0A0B0C\"\r\n+CMSG: Done\r\n",
    );
    script.enqueue_reply(b"+TEMP: 23\r\n");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== LoRa-E5 Join and Send Demo ===\n");

    let script = MockChannel::new();
    script_module_replies(&script);
    let mut lora = LoRaE5::new(script.clone())?;

    println!("Resetting module and waiting for it to answer...");
    lora.init().await?;

    println!("Programming network identity...");
    lora.set_identity(&DeviceIdentity {
        dev_addr: "32 30 AA BB".into(),
        app_eui: "48 83 C7 DF 30 06 00 00".into(),
        app_key: "71 A4 36 4B 48 45 03 5D D7 8A 4E D8 AC 7F 90 17".into(),
        ..Default::default()
    })
    .await?;

    println!("Joining the network (OTAA)...");
    lora.join().await?;
    println!("  Joined: {}\n", lora.is_joined());

    println!("Sending a confirmed uplink on port 8...");
    match lora.send_confirmed_string("hello from rust", 8).await? {
        Some(downlink) => {
            let hex: String = downlink.payload.iter().map(|b| format!("{b:02X}")).collect();
            println!("  Downlink on port {}: {}\n", downlink.port, hex);
        }
        None => println!("  No downlink in the RX windows\n"),
    }

    println!("Module temperature: {} C", lora.temperature().await?);

    println!("\nCommands sent on the wire:");
    for write in script.writes() {
        println!("  > {}", String::from_utf8_lossy(&write).trim_end());
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
