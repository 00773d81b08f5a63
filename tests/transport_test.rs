//! End-to-end transport behavior over a scripted channel.
//!
//! Every timing-sensitive test runs under a paused tokio clock, so the
//! documented deadlines are asserted exactly and the suite finishes in
//! milliseconds of wall time.

use std::sync::Arc;
use std::time::Duration;

use lora_at::{
    AtError, CommandDescriptor, CommandTable, CommandTransport, MockChannel, TransportSettings,
};
use tokio::time::Instant;

fn table() -> Arc<CommandTable> {
    let table = CommandTable::builder()
        .command(
            CommandDescriptor::expect("ping", "AT", "+AT: OK")
                .with_timeout(Duration::from_millis(2500)),
        )
        .command(CommandDescriptor::expect("reset", "AT+RESET", "+RESET:"))
        .command(CommandDescriptor::expect_any(
            "send",
            "AT+MSG",
            ["+MSG: Done", "+MSG: PORT"],
        ))
        .command(CommandDescriptor::fire_and_forget("buzz", "AT+BUZZ"))
        .build()
        .unwrap();
    Arc::new(table)
}

fn transport(script: &MockChannel) -> CommandTransport<MockChannel> {
    CommandTransport::new(script.clone(), table())
}

#[test]
fn lookup_returns_registered_descriptor() {
    let table = table();
    let descriptor = table.lookup("ping").unwrap();
    assert_eq!(
        *descriptor,
        CommandDescriptor::expect("ping", "AT", "+AT: OK")
            .with_timeout(Duration::from_millis(2500))
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_command_fails_without_touching_channel() {
    let script = MockChannel::new();
    let mut transport = transport(&script);

    let err = transport.execute("warp", &[]).await.unwrap_err();
    assert!(matches!(err, AtError::UnknownCommand(id) if id == "warp"));

    assert!(script.writes().is_empty());
    assert_eq!(script.read_attempts(), 0);
    assert_eq!(script.flush_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_returns_after_write_with_zero_reads() {
    let script = MockChannel::new();
    let mut transport = transport(&script);

    let start = Instant::now();
    let body = transport.execute("buzz", &[]).await.unwrap();

    assert!(body.is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(script.writes(), vec![b"AT+BUZZ\r\n".to_vec()]);
    assert_eq!(script.read_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn success_returns_accumulated_bytes_and_stops_reading() {
    let script = MockChannel::new();
    script.enqueue_reply(b"+AT: OK\r\n+LATER: 1\r\n");
    let mut transport = transport(&script);

    let body = transport.execute("ping", &[]).await.unwrap();
    assert_eq!(body, b"+AT: OK");

    // The second line was never consumed
    assert!(script.unread_bytes() > 0);
}

#[tokio::test(start_paused = true)]
async fn silent_channel_times_out_within_documented_bounds() {
    let script = MockChannel::new();
    let mut transport = transport(&script);

    let overall = Duration::from_millis(2500);
    let line_timeout = Duration::from_millis(2000);
    let backoff = Duration::from_millis(400);

    let start = Instant::now();
    let err = transport.execute("ping", &[]).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, AtError::Timeout { ref id, timeout } if id == "ping" && timeout == overall));
    assert!(elapsed >= overall, "returned early: {elapsed:?}");
    assert!(
        elapsed <= overall + line_timeout + backoff,
        "returned late: {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn partial_line_near_deadline_still_honors_upper_bound() {
    let script = MockChannel::new();
    // A line that starts just before the overall deadline and never
    // finishes forces one full per-line timeout on top of it
    script.push_bytes_after(Duration::from_millis(2400), b"+stuck");
    let mut transport = transport(&script);

    let start = Instant::now();
    let err = transport.execute("ping", &[]).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= Duration::from_millis(2500));
    assert!(elapsed <= Duration::from_millis(2500 + 2000 + 400));
}

#[tokio::test(start_paused = true)]
async fn non_matching_lines_still_time_out() {
    let script = MockChannel::new();
    script.enqueue_reply(b"+FOO: 1\r\n+FOO: 2\r\n");
    let mut transport = transport(&script);

    let start = Instant::now();
    let err = transport.execute("ping", &[]).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(start.elapsed() >= Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn second_alternative_matches_downlink_form() {
    let script = MockChannel::new();
    script.enqueue_reply(b"+MSG: PORT: 5; RX: \"0102\"\r\n");
    let mut transport = transport(&script);

    let body = transport.execute("send", &[]).await.unwrap();
    assert_eq!(body, b"+MSG: PORT: 5; RX: \"0102\"");
}

#[tokio::test(start_paused = true)]
async fn error_marker_overrides_structural_match() {
    let script = MockChannel::new();
    // Structurally this line matches the "+RESET:" pattern
    script.enqueue_reply(b"+RESET: ERROR\r\n");
    let mut transport = transport(&script);

    let err = transport.execute("reset", &[]).await.unwrap_err();
    match err {
        AtError::Protocol { id, response } => {
            assert_eq!(id, "reset");
            assert!(response.contains("+RESET: ERROR"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_bytes_are_flushed_before_the_exchange() {
    let script = MockChannel::new();
    script.push_bytes(b"+OLD: LEFTOVER\r\n");
    script.enqueue_reply(b"+AT: OK\r\n");
    let mut transport = transport(&script);

    let body = transport.execute("ping", &[]).await.unwrap();

    assert_eq!(body, b"+AT: OK");
    assert_eq!(script.flush_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reply_after_fifty_ms_returns_within_one_poll_cycle() {
    let script = MockChannel::new();
    script.enqueue_reply_after(Duration::from_millis(50), b"+AT: OK\r\n");
    let mut transport = transport(&script);

    let start = Instant::now();
    let body = transport.execute("ping", &[]).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(body, b"+AT: OK");
    assert!(elapsed <= Duration::from_millis(450), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn custom_settings_shorten_the_poll_cycle() {
    let script = MockChannel::new();
    script.enqueue_reply_after(Duration::from_millis(50), b"+AT: OK\r\n");
    let settings = TransportSettings {
        poll_backoff: Duration::from_millis(25),
        ..TransportSettings::default()
    };
    let mut transport = CommandTransport::with_settings(script.clone(), table(), &settings);

    let start = Instant::now();
    transport.execute("ping", &[]).await.unwrap();
    // Two 25 ms backoffs land the poll right on the reply's arrival
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}
