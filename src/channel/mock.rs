//! Scripted in-memory channel for tests and demos.
//!
//! `MockChannel` plays the role of the radio module: tests preload bytes
//! (available immediately or after a delay) or script replies that become
//! available once a command is written. Every interaction is counted, so
//! tests can assert not just what a command returned but how it touched
//! the channel; writes, read attempts, and input flushes are all recorded.
//!
//! Delays are measured on the tokio clock, so under
//! `#[tokio::test(start_paused = true)]` scripted arrivals line up exactly
//! with the transport's sleeps.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::channel::SerialChannel;

#[derive(Default)]
struct Inner {
    rx: VecDeque<u8>,
    scheduled: Vec<(Instant, Vec<u8>)>,
    replies: VecDeque<(Duration, Vec<u8>)>,
    writes: Vec<Vec<u8>>,
    read_calls: usize,
    flush_calls: usize,
}

impl Inner {
    /// Move scheduled bytes whose arrival time has passed into the
    /// receive buffer.
    fn promote(&mut self, now: Instant) {
        let mut due: Vec<(Instant, Vec<u8>)> = Vec::new();
        self.scheduled.retain_mut(|(at, bytes)| {
            if *at <= now {
                due.push((*at, std::mem::take(bytes)));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, bytes) in due {
            self.rx.extend(bytes);
        }
    }
}

/// In-memory [`SerialChannel`] with scripted behavior.
///
/// Clones share the same state, so a test can hand one clone to the
/// transport and keep another for scripting and assertions.
#[derive(Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<Inner>>,
}

impl MockChannel {
    /// A channel with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `bytes` readable immediately.
    pub fn push_bytes(&self, bytes: impl AsRef<[u8]>) {
        self.lock().rx.extend(bytes.as_ref());
    }

    /// Make `bytes` readable once `delay` has elapsed on the tokio clock.
    pub fn push_bytes_after(&self, delay: Duration, bytes: impl AsRef<[u8]>) {
        self.lock()
            .scheduled
            .push((Instant::now() + delay, bytes.as_ref().to_vec()));
    }

    /// Script a reply that becomes readable as soon as the next
    /// unanswered write happens.
    pub fn enqueue_reply(&self, bytes: impl AsRef<[u8]>) {
        self.enqueue_reply_after(Duration::ZERO, bytes);
    }

    /// Script a reply that becomes readable `delay` after the next
    /// unanswered write.
    pub fn enqueue_reply_after(&self, delay: Duration, bytes: impl AsRef<[u8]>) {
        self.lock()
            .replies
            .push_back((delay, bytes.as_ref().to_vec()));
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// The most recent write, decoded lossily for assertions.
    pub fn last_write(&self) -> Option<String> {
        self.lock()
            .writes
            .last()
            .map(|w| String::from_utf8_lossy(w).into_owned())
    }

    /// How many times `read_byte` was called (hits and misses both).
    pub fn read_attempts(&self) -> usize {
        self.lock().read_calls
    }

    /// How many times the input buffer was flushed.
    pub fn flush_count(&self) -> usize {
        self.lock().flush_calls
    }

    /// Bytes scripted but never consumed, readable or still scheduled.
    pub fn unread_bytes(&self) -> usize {
        let inner = self.lock();
        inner.rx.len() + inner.scheduled.iter().map(|(_, b)| b.len()).sum::<usize>()
    }
}

#[async_trait]
impl SerialChannel for MockChannel {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        inner.writes.push(bytes.to_vec());
        if let Some((delay, reply)) = inner.replies.pop_front() {
            inner.scheduled.push((Instant::now() + delay, reply));
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut inner = self.lock();
        inner.read_calls += 1;
        inner.promote(Instant::now());
        Ok(inner.rx.pop_front())
    }

    async fn bytes_available(&mut self) -> io::Result<usize> {
        let mut inner = self.lock();
        inner.promote(Instant::now());
        Ok(inner.rx.len())
    }

    async fn clear_input(&mut self) -> io::Result<()> {
        let mut inner = self.lock();
        inner.flush_calls += 1;
        inner.promote(Instant::now());
        inner.rx.clear();
        Ok(())
    }
}
