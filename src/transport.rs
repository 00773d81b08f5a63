//! Command execution over a serial channel.
//!
//! [`CommandTransport`] drives one command at a time to completion: flush
//! stale input, write the rendered command, then poll the line reader,
//! accumulating response lines until one matches the descriptor's success
//! pattern or the command's overall deadline elapses.
//!
//! Two clocks bound the exchange. The per-line deadline (fixed, from
//! [`TransportSettings`]) caps how long a single `read_line` call may
//! take; the overall deadline (per command, from the descriptor) caps the
//! whole exchange and is the one surfaced to the caller on timeout.
//! Between polling rounds the loop sleeps a backoff interval so a slow
//! module is not busy-spun.
//!
//! The transport owns its channel exclusively; a command in flight is
//! never interleaved with another. Callers needing concurrent commands on
//! one physical port must serialize access externally.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::channel::SerialChannel;
use crate::command::{CommandParam, CommandTable, OutgoingCommand};
use crate::config::TransportSettings;
use crate::error::{AtError, AtResult};
use crate::line_reader::{LineReader, ReadOutcome};
use crate::response;

/// Executes commands from a shared, read-only [`CommandTable`] over an
/// exclusively owned [`SerialChannel`].
pub struct CommandTransport<C: SerialChannel> {
    channel: C,
    table: Arc<CommandTable>,
    line_reader: LineReader,
    poll_backoff: Duration,
}

impl<C: SerialChannel> CommandTransport<C> {
    /// Transport with the default timings.
    pub fn new(channel: C, table: Arc<CommandTable>) -> Self {
        Self::with_settings(channel, table, &TransportSettings::default())
    }

    /// Transport with explicit timings.
    pub fn with_settings(
        channel: C,
        table: Arc<CommandTable>,
        settings: &TransportSettings,
    ) -> Self {
        Self {
            channel,
            table,
            line_reader: LineReader::from_settings(settings),
            poll_backoff: settings.poll_backoff,
        }
    }

    /// The command table this transport resolves identifiers against.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Execute the command registered under `id` in its write form.
    ///
    /// Returns the accumulated response bytes up to and including the
    /// matching line, or empty bytes for a fire-and-forget command.
    pub async fn execute(&mut self, id: &str, params: &[CommandParam]) -> AtResult<Vec<u8>> {
        self.run(id, params, false, None).await
    }

    /// Execute the command in its read form (`?` appended after the
    /// parameters).
    pub async fn query(&mut self, id: &str, params: &[CommandParam]) -> AtResult<Vec<u8>> {
        self.run(id, params, true, None).await
    }

    /// Like [`execute`], but abandons the exchange with
    /// [`AtError::Cancelled`] when `cancel` fires.
    ///
    /// Plain [`execute`] always runs an exchange to completion. Here the
    /// token is checked at each polling round and while sleeping the
    /// backoff, so cancellation latency is bounded by one poll cycle.
    ///
    /// [`execute`]: CommandTransport::execute
    pub async fn execute_cancellable(
        &mut self,
        id: &str,
        params: &[CommandParam],
        cancel: &CancellationToken,
    ) -> AtResult<Vec<u8>> {
        self.run(id, params, false, Some(cancel)).await
    }

    async fn run(
        &mut self,
        id: &str,
        params: &[CommandParam],
        query: bool,
        cancel: Option<&CancellationToken>,
    ) -> AtResult<Vec<u8>> {
        // Resolve before touching the channel; an unknown identifier is a
        // programmer error and must have no side effects.
        let descriptor = self.table.lookup(id)?.clone();

        let outgoing = if query {
            OutgoingCommand::query(&descriptor, params)
        } else {
            OutgoingCommand::new(&descriptor, params)
        };
        let encoded = outgoing.encode();

        // Anything still unread belongs to an earlier exchange and must
        // not be misattributed to this one.
        let stale = self.channel.bytes_available().await?;
        if stale > 0 {
            warn!("Discarding {stale} stale byte(s) before command '{id}'");
        }
        self.channel.clear_input().await?;

        self.channel.write(&encoded).await?;
        debug!(
            "Sent command '{}': {}",
            id,
            String::from_utf8_lossy(&encoded).trim_end()
        );

        let Some(pattern) = descriptor.pattern.as_ref() else {
            debug!("Command '{id}' expects no reply");
            return Ok(Vec::new());
        };

        let overall = descriptor.timeout;
        let start = Instant::now();
        let mut accumulated: Vec<u8> = Vec::new();

        loop {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    return Err(AtError::Cancelled { id: id.to_string() });
                }
            }
            if start.elapsed() >= overall {
                return Err(AtError::Timeout {
                    id: id.to_string(),
                    timeout: overall,
                });
            }

            match self.line_reader.read_line(&mut self.channel).await? {
                ReadOutcome::Line(line) => {
                    let is_error = response::contains_error_marker(&line);
                    let matched = response::match_line(&line, pattern).map(str::to_owned);
                    accumulated.extend_from_slice(&line);

                    // An error marker overrides a structural match
                    if is_error {
                        let text = String::from_utf8_lossy(&accumulated).into_owned();
                        warn!("Command '{id}' failed: {text}");
                        return Err(AtError::Protocol {
                            id: id.to_string(),
                            response: text,
                        });
                    }
                    if let Some(alternative) = matched {
                        debug!("Command '{id}' matched '{alternative}'");
                        return Ok(accumulated);
                    }
                }
                ReadOutcome::NoData | ReadOutcome::TimedOut => {}
            }

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(AtError::Cancelled { id: id.to_string() });
                        }
                        _ = sleep(self.poll_backoff) => {}
                    }
                }
                None => sleep(self.poll_backoff).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use crate::command::CommandDescriptor;

    fn table() -> Arc<CommandTable> {
        let table = CommandTable::builder()
            .command(CommandDescriptor::expect("ping", "AT", "+AT: OK"))
            .command(CommandDescriptor::expect("port", "AT+PORT", "+PORT:"))
            .command(
                CommandDescriptor::expect("join", "AT+JOIN", "+JOIN: Done")
                    .with_timeout(Duration::from_secs(20)),
            )
            .build()
            .unwrap();
        Arc::new(table)
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_appends_question_mark() {
        let script = MockChannel::new();
        script.enqueue_reply(b"+PORT: 8\r\n");
        let mut transport = CommandTransport::new(script.clone(), table());

        let body = transport.query("port", &[]).await.unwrap();
        assert_eq!(body, b"+PORT: 8");
        assert_eq!(script.last_write().as_deref(), Some("AT+PORT?\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_error_reports_accumulated_response() {
        let script = MockChannel::new();
        script.enqueue_reply(b"+JOIN: Start\r\n+JOIN: ERROR\r\n");
        let mut transport = CommandTransport::new(script.clone(), table());

        let err = transport.execute("join", &[]).await.unwrap_err();
        match err {
            AtError::Protocol { id, response } => {
                assert_eq!(id, "join");
                assert!(response.contains("+JOIN: Start"));
                assert!(response.contains("+JOIN: ERROR"));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let script = MockChannel::new();
        let mut transport = CommandTransport::new(script.clone(), table());
        let token = CancellationToken::new();

        let cancel_at = Duration::from_millis(150);
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(cancel_at).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = transport
            .execute_cancellable("join", &[], &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AtError::Cancelled { id } if id == "join"));
        // Fired mid-backoff, well before the 20 s deadline
        assert_eq!(start.elapsed(), cancel_at);
    }
}
