//! Extracts response lines from the raw byte stream.
//!
//! The module frames every response line the same way: noise, then a `+`
//! marker, then the line body, then `\r` or `\n`. [`LineReader`] consumes
//! the channel one byte at a time, discards everything before the marker,
//! and hands back one complete line per call, bounded by a fixed per-line
//! deadline.

use std::io;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::channel::SerialChannel;
use crate::config::TransportSettings;

/// First byte of every response line.
const START_MARKER: u8 = b'+';

/// Outcome of one [`LineReader::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, marker through last content byte, terminator
    /// stripped.
    Line(Vec<u8>),
    /// The channel was dry before a marker appeared. Not an error; the
    /// caller polls again at its own cadence.
    NoData,
    /// The per-line deadline elapsed with a line still incomplete.
    TimedOut,
}

/// Byte-at-a-time reader for `+`-framed response lines.
#[derive(Debug, Clone)]
pub struct LineReader {
    line_timeout: Duration,
    poll_interval: Duration,
}

impl LineReader {
    /// Reader with an explicit per-line deadline and mid-line poll pause.
    pub fn new(line_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            line_timeout,
            poll_interval,
        }
    }

    /// Reader using the timings from `settings`.
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self::new(settings.line_timeout, settings.poll_interval)
    }

    /// The per-line deadline this reader enforces.
    pub fn line_timeout(&self) -> Duration {
        self.line_timeout
    }

    /// Read one response line from `channel`.
    ///
    /// Returns [`ReadOutcome::NoData`] immediately when the channel is dry
    /// before the marker; once a line is in progress, waits out short gaps
    /// in the stream up to the per-line deadline. An empty line (terminator
    /// straight after the marker) also reports as `NoData`, never as a
    /// zero-content line.
    pub async fn read_line<C: SerialChannel>(&self, channel: &mut C) -> io::Result<ReadOutcome> {
        let start = Instant::now();
        let mut line: Vec<u8> = Vec::new();
        let mut started = false;

        loop {
            if start.elapsed() >= self.line_timeout {
                return Ok(ReadOutcome::TimedOut);
            }

            match channel.read_byte().await? {
                Some(byte) => {
                    if !started {
                        // Everything before the marker is noise
                        if byte == START_MARKER {
                            started = true;
                            line.push(byte);
                        }
                    } else if byte == b'\r' || byte == b'\n' {
                        if line.len() <= 1 {
                            return Ok(ReadOutcome::NoData);
                        }
                        return Ok(ReadOutcome::Line(line));
                    } else {
                        line.push(byte);
                    }
                }
                None => {
                    if !started {
                        return Ok(ReadOutcome::NoData);
                    }
                    // Mid-line gap, wait for the rest
                    sleep(self.poll_interval).await;
                }
            }
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::from_settings(&TransportSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;

    fn reader() -> LineReader {
        LineReader::default()
    }

    #[tokio::test]
    async fn test_reads_complete_line() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"+AT: OK\r\n");

        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Line(b"+AT: OK".to_vec()));
    }

    #[tokio::test]
    async fn test_discards_noise_before_marker() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"garbage\x00\xff+ID: DevAddr\r\n");

        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Line(b"+ID: DevAddr".to_vec()));
    }

    #[tokio::test]
    async fn test_dry_channel_reports_no_data() {
        let mut channel = MockChannel::new();
        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::NoData);
    }

    #[tokio::test]
    async fn test_empty_line_reports_no_data() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"+\r\n");

        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::NoData);
    }

    #[tokio::test]
    async fn test_line_feed_also_terminates() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"+MODE: LWOTAA\n");

        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Line(b"+MODE: LWOTAA".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_out_mid_line_gap() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"+TEMP:");
        script.push_bytes_after(Duration::from_millis(30), b" 21.5\r\n");

        let start = Instant::now();
        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Line(b"+TEMP: 21.5".to_vec()));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unterminated_line_times_out() {
        let script = MockChannel::new();
        let mut channel = script.clone();
        script.push_bytes(b"+JOIN: Netw");

        let start = Instant::now();
        let outcome = reader().read_line(&mut channel).await.unwrap();
        assert_eq!(outcome, ReadOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }
}
