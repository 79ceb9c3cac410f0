//! Session state machine over an accumulated receive buffer.
//!
//! [`StreamFramer`] is deliberately free of I/O. It is driven by events
//! and tells its driver what to do with the link through [`Directive`]s:
//!
//! ```text
//!            start                on_open
//!  Closed ----------> Opening -------------> Listening <-----------+
//!    ^                   ^                      |                   |
//!    |                   | reopen due           | frame detected    | session open, or
//!    |                   |                      v                   | continuous mode
//!    |  on_closed     Closing <------------- Handling --------------+
//!    +---------------------'   poll mode,
//!                              session complete
//! ```
//!
//! # Fatal conditions
//!
//! - Buffer overflow and watchdog expiry stop the framer for good: both
//!   timers are cancelled, the link is closed and every later event is
//!   ignored.
//! - Decode failures end the current session (link closed, timers
//!   cancelled) and are returned to the caller; the framer is not stopped.
//!
//! Link errors and disconnects only drop the connection flag and the
//! buffered bytes. Whether the session recovers is left to the reopen
//! timer or the watchdog.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use meterlink_core::{DebugLevel, Error, FramerSettings, Result};
use meterlink_protocol::ProtocolStrategy;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::timer::Timer;

/// Lifecycle state of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// No link; nothing scheduled or waiting for the reopen timer.
    Closed,
    /// Waiting for the link to report open.
    Opening,
    /// Accepting inbound chunks.
    Listening,
    /// Decoding a detected frame; intake suspended.
    Handling,
    /// Waiting for the link to report closed.
    Closing,
}

/// Action the driver must perform on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    OpenLink,
    CloseLink,
}

/// Receive buffer, timers and session transitions for one link.
#[derive(Debug)]
pub struct StreamFramer<P> {
    protocol: P,
    capacity: usize,
    message_timeout: Duration,
    request_interval: Option<Duration>,
    debug: DebugLevel,
    can_send: bool,

    buffer: BytesMut,
    state: FramerState,
    connected: bool,
    stopped: bool,
    watchdog: Timer,
    reopen: Timer,
    directives: VecDeque<Directive>,
}

impl<P: ProtocolStrategy> StreamFramer<P> {
    pub fn new(protocol: P, settings: &FramerSettings) -> Self {
        Self {
            protocol,
            capacity: settings.max_buffer_size,
            message_timeout: settings.message_timeout(),
            request_interval: settings.request_interval(),
            debug: DebugLevel::Off,
            can_send: false,
            buffer: BytesMut::with_capacity(settings.max_buffer_size),
            state: FramerState::Closed,
            connected: false,
            stopped: false,
            watchdog: Timer::new(),
            reopen: Timer::new(),
            directives: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    /// Declare whether the link can transmit.
    #[must_use]
    pub fn can_send(mut self, can_send: bool) -> Self {
        self.can_send = can_send;
        self
    }

    #[must_use]
    pub fn state(&self) -> FramerState {
        self.state
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Bytes currently held in the receive buffer.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    #[must_use]
    pub fn watchdog(&self) -> &Timer {
        &self.watchdog
    }

    /// Whether the driver should read from the link now.
    #[must_use]
    pub fn accepts_intake(&self) -> bool {
        !self.stopped && self.connected && self.state == FramerState::Listening
    }

    /// Earliest armed timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.watchdog.deadline(), self.reopen.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Next pending link action, in the order they were issued.
    pub fn poll_directive(&mut self) -> Option<Directive> {
        self.directives.pop_front()
    }

    /// Begin the first session.
    pub fn start(&mut self) {
        if self.stopped || self.state != FramerState::Closed {
            return;
        }
        self.state = FramerState::Opening;
        self.directives.push_back(Directive::OpenLink);
    }

    /// The link reported open: fresh buffer, fresh protocol state, watchdog armed.
    pub fn on_open(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        if self.debug.is_verbose() {
            debug!("Link open");
        }
        self.connected = true;
        self.buffer.clear();
        self.protocol.init_state();
        self.arm_watchdog(now);
        self.state = FramerState::Listening;
    }

    /// Opening the link failed.
    ///
    /// In poll mode another attempt is scheduled after the request interval.
    ///
    /// # Errors
    /// Returns `error` when no retry is scheduled (continuous mode).
    pub fn on_open_failed(&mut self, error: Error, now: Instant) -> Result<()> {
        self.connected = false;
        self.buffer.clear();
        self.state = FramerState::Closed;
        if self.stopped {
            return Ok(());
        }
        match self.request_interval {
            Some(interval) => {
                if self.debug.reports_errors() {
                    warn!(error = %error, retry_in = ?interval, "Failed to open link");
                }
                self.reopen.arm(now, interval);
                Ok(())
            }
            None => Err(error),
        }
    }

    /// The link closed, on request or because the peer went away.
    pub fn on_closed(&mut self) {
        if self.debug.is_verbose() {
            debug!("Link closed");
        }
        self.connected = false;
        self.buffer.clear();
        self.state = FramerState::Closed;
    }

    /// The link reported an error; the connection is considered lost.
    pub fn on_link_error(&mut self, error: &Error) {
        if self.debug.reports_errors() {
            warn!(error = %error, "Link error");
        }
        self.connected = false;
        self.buffer.clear();
        if !self.stopped {
            self.state = FramerState::Closed;
        }
    }

    /// Append an inbound chunk and handle every frame it completes.
    ///
    /// # Errors
    /// - `Error::BufferOverflow` when the chunk does not fit or the buffer
    ///   is full without a frame. The framer is stopped.
    /// - Decode errors from the protocol. The session is torn down.
    pub fn on_data(&mut self, chunk: &[u8], now: Instant) -> Result<()> {
        if !self.accepts_intake() {
            trace!(len = chunk.len(), state = ?self.state, "Ignoring chunk outside listening state");
            return Ok(());
        }

        if self.buffer.len() + chunk.len() > self.capacity {
            return Err(self.overflow());
        }
        self.buffer.extend_from_slice(chunk);

        if self.debug.is_verbose() {
            debug!(chunk = chunk.len(), buffered = self.buffer.len(), "Received data");
        }

        loop {
            if !self.protocol.detect_complete_frame(&self.buffer) {
                if self.buffer.len() == self.capacity {
                    return Err(self.overflow());
                }
                return Ok(());
            }

            self.handle_frame(now)?;

            // Retained bytes may already hold the next complete frame
            if self.state != FramerState::Listening || self.buffer.is_empty() {
                return Ok(());
            }
        }
    }

    /// Fire due timers.
    ///
    /// # Errors
    /// Returns `Error::Timeout` when the watchdog expired. The framer is stopped.
    pub fn poll_timers(&mut self, now: Instant) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        if self.watchdog.fire_if_due(now) {
            let timeout_ms = u64::try_from(self.message_timeout.as_millis()).unwrap_or(u64::MAX);
            if self.debug.is_verbose() {
                debug!(timeout_ms, "Message timeout triggered");
            }
            self.stop();
            return Err(Error::Timeout { timeout_ms });
        }

        if self.reopen.fire_if_due(now) {
            if self.debug.is_verbose() {
                debug!("Reopening link for next session");
            }
            self.state = FramerState::Opening;
            self.directives.push_back(Directive::OpenLink);
        }

        Ok(())
    }

    /// Stop for good: cancel both timers and close the link if connected.
    ///
    /// Idempotent. Later events are ignored.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!(protocol = self.protocol.name(), "Stopping transport");
        self.stopped = true;
        self.watchdog.cancel();
        self.reopen.cancel();
        if self.connected {
            self.state = FramerState::Closing;
            self.directives.push_back(Directive::CloseLink);
        } else {
            self.state = FramerState::Closed;
        }
    }

    fn handle_frame(&mut self, now: Instant) -> Result<()> {
        self.state = FramerState::Handling;
        self.watchdog.cancel();

        if self.debug.is_verbose() {
            debug!(buffered = self.buffer.len(), "Complete frame detected");
        }

        let decoded = match self.protocol.decode_frame(&self.buffer) {
            Ok(decoded) => decoded,
            Err(error) => {
                self.teardown();
                return Err(error);
            }
        };

        self.buffer.clear();
        self.buffer.extend_from_slice(&decoded.leftover);
        self.arm_watchdog(now);

        if self.protocol.pending_outbound_count() > 0 && !self.can_send {
            warn!(
                protocol = self.protocol.name(),
                pending = self.protocol.pending_outbound_count(),
                "Link does not support sending, ignoring outbound messages"
            );
        }

        match self.request_interval {
            Some(interval) if self.protocol.is_session_complete() => {
                if self.debug.is_verbose() {
                    debug!(interval = ?interval, "Scheduling next run");
                }
                self.watchdog.cancel();
                self.state = FramerState::Closing;
                self.directives.push_back(Directive::CloseLink);
                self.reopen.arm(now, interval);
            }
            _ => self.state = FramerState::Listening,
        }

        if self.debug.is_verbose() {
            debug!(remaining = self.buffer.len(), "Remaining data after frame handling");
        }
        Ok(())
    }

    fn arm_watchdog(&mut self, now: Instant) {
        if self.debug.is_verbose() {
            debug!(timeout = ?self.message_timeout, "Set message timeout timer");
        }
        self.watchdog.arm(now, self.message_timeout);
    }

    /// End the current session after a decode failure.
    fn teardown(&mut self) {
        self.watchdog.cancel();
        self.reopen.cancel();
        self.buffer.clear();
        if self.connected {
            self.state = FramerState::Closing;
            self.directives.push_back(Directive::CloseLink);
        } else {
            self.state = FramerState::Closed;
        }
    }

    fn overflow(&mut self) -> Error {
        self.stop();
        Error::BufferOverflow {
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meterlink_core::Measurements;
    use meterlink_protocol::DecodedFrame;
    use rstest::rstest;

    /// Line protocol: a frame is everything up to and including the
    /// first `\n`; a line starting with `!` fails to decode.
    #[derive(Debug, Default)]
    struct LineProtocol {
        frames: Vec<Vec<u8>>,
        init_calls: usize,
        outbound: usize,
        session_frames: Option<usize>,
        frames_this_session: usize,
    }

    impl ProtocolStrategy for LineProtocol {
        fn name(&self) -> &'static str {
            "line"
        }

        fn init_state(&mut self) {
            self.init_calls += 1;
            self.frames_this_session = 0;
        }

        fn is_session_complete(&self) -> bool {
            self.session_frames.is_none_or(|n| self.frames_this_session >= n)
        }

        fn pending_outbound_count(&self) -> usize {
            self.outbound
        }

        fn detect_complete_frame(&self, buffer: &[u8]) -> bool {
            buffer.contains(&b'\n')
        }

        fn decode_frame(&mut self, buffer: &[u8]) -> Result<DecodedFrame> {
            let end = buffer.iter().position(|&b| b == b'\n').map_or(buffer.len(), |p| p + 1);
            if buffer.first() == Some(&b'!') {
                return Err(Error::frame_decode("bang"));
            }
            self.frames.push(buffer[..end].to_vec());
            self.frames_this_session += 1;
            Ok(DecodedFrame {
                measurements: Measurements::new(),
                leftover: buffer[end..].to_vec(),
            })
        }
    }

    fn settings(capacity: usize, interval_secs: u64) -> FramerSettings {
        FramerSettings {
            max_buffer_size: capacity,
            message_timeout_ms: 1_000,
            request_interval_secs: interval_secs,
        }
    }

    fn open_framer(capacity: usize, interval_secs: u64) -> (StreamFramer<LineProtocol>, Instant) {
        let mut framer = StreamFramer::new(LineProtocol::default(), &settings(capacity, interval_secs));
        let now = Instant::now();
        framer.start();
        assert_eq!(framer.poll_directive(), Some(Directive::OpenLink));
        framer.on_open(now);
        (framer, now)
    }

    #[test]
    fn test_open_resets_and_arms_watchdog() {
        let (framer, now) = open_framer(64, 0);
        assert_eq!(framer.state(), FramerState::Listening);
        assert!(framer.accepts_intake());
        assert_eq!(framer.protocol().init_calls, 1);
        assert_eq!(framer.watchdog().deadline(), Some(now + Duration::from_secs(1)));
        assert!(framer.buffered().is_empty());
    }

    #[test]
    fn test_partial_data_accumulates() {
        let (mut framer, now) = open_framer(64, 0);
        framer.on_data(b"abc", now).unwrap();
        framer.on_data(b"def", now).unwrap();
        assert_eq!(framer.buffered(), b"abcdef");
        assert!(framer.protocol().frames.is_empty());
    }

    #[test]
    fn test_frame_with_leftover() {
        let (mut framer, now) = open_framer(64, 0);
        let later = now + Duration::from_millis(500);
        framer.on_data(b"one\ntw", later).unwrap();

        assert_eq!(framer.protocol().frames, vec![b"one\n".to_vec()]);
        assert_eq!(framer.buffered(), b"tw");
        assert_eq!(framer.state(), FramerState::Listening);
        assert_eq!(framer.watchdog().deadline(), Some(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_leftover_reexamined_immediately() {
        let (mut framer, now) = open_framer(64, 0);
        framer.on_data(b"a\nb\nc", now).unwrap();

        assert_eq!(framer.protocol().frames, vec![b"a\n".to_vec(), b"b\n".to_vec()]);
        assert_eq!(framer.buffered(), b"c");
    }

    #[test]
    fn test_overflow_exactly_at_capacity() {
        let (mut framer, now) = open_framer(8, 0);
        framer.on_data(b"1234567", now).unwrap();
        assert!(!framer.is_stopped());

        let result = framer.on_data(b"8", now);
        assert!(matches!(result, Err(Error::BufferOverflow { capacity: 8 })));
        assert!(framer.is_stopped());
        assert_eq!(framer.poll_directive(), Some(Directive::CloseLink));
        assert!(!framer.watchdog().is_armed());
    }

    #[test]
    fn test_chunk_exceeding_capacity_overflows() {
        let (mut framer, now) = open_framer(8, 0);
        framer.on_data(b"12345", now).unwrap();
        let result = framer.on_data(b"6789", now);
        assert!(matches!(result, Err(Error::BufferOverflow { .. })));
        assert!(framer.is_stopped());
    }

    #[test]
    fn test_frame_filling_capacity_is_not_overflow() {
        let (mut framer, now) = open_framer(8, 0);
        framer.on_data(b"1234567\n", now).unwrap();
        assert!(!framer.is_stopped());
        assert!(framer.buffered().is_empty());
    }

    #[test]
    fn test_watchdog_stops_transport() {
        let (mut framer, now) = open_framer(64, 0);
        framer.poll_timers(now + Duration::from_millis(999)).unwrap();
        assert!(!framer.is_stopped());

        let result = framer.poll_timers(now + Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Timeout { timeout_ms: 1_000 })));
        assert!(framer.is_stopped());
        assert_eq!(framer.poll_directive(), Some(Directive::CloseLink));
        assert_eq!(framer.next_deadline(), None);

        // Subsequent events are no-ops
        framer.on_data(b"late\n", now).unwrap();
        assert!(framer.protocol().frames.is_empty());
        framer.poll_timers(now + Duration::from_secs(10)).unwrap();
        framer.on_open(now);
        assert!(!framer.accepts_intake());
    }

    #[test]
    fn test_poll_mode_closes_and_reopens() {
        let (mut framer, now) = open_framer(64, 30);
        framer.on_data(b"reading\n", now).unwrap();

        assert_eq!(framer.state(), FramerState::Closing);
        assert_eq!(framer.poll_directive(), Some(Directive::CloseLink));
        assert!(!framer.watchdog().is_armed());
        assert_eq!(framer.next_deadline(), Some(now + Duration::from_secs(30)));

        framer.on_closed();
        assert_eq!(framer.state(), FramerState::Closed);

        framer.poll_timers(now + Duration::from_secs(30)).unwrap();
        assert_eq!(framer.state(), FramerState::Opening);
        assert_eq!(framer.poll_directive(), Some(Directive::OpenLink));
        // Protocol state resets once per session, when the link opens
        assert_eq!(framer.protocol().init_calls, 1);

        framer.on_open(now + Duration::from_secs(31));
        assert!(framer.accepts_intake());
        assert_eq!(framer.protocol().init_calls, 2);
    }

    #[test]
    fn test_poll_mode_waits_for_session_completion() {
        let mut protocol = LineProtocol::default();
        protocol.session_frames = Some(2);
        let mut framer = StreamFramer::new(protocol, &settings(64, 30));
        let now = Instant::now();
        framer.start();
        framer.poll_directive();
        framer.on_open(now);

        framer.on_data(b"first\n", now).unwrap();
        assert_eq!(framer.state(), FramerState::Listening);
        assert!(framer.watchdog().is_armed());

        framer.on_data(b"second\n", now).unwrap();
        assert_eq!(framer.state(), FramerState::Closing);
    }

    #[test]
    fn test_decode_error_tears_down_session() {
        let (mut framer, now) = open_framer(64, 0);
        let result = framer.on_data(b"!broken\n", now);

        assert!(matches!(result, Err(Error::FrameDecode(_))));
        assert!(!framer.is_stopped());
        assert_eq!(framer.poll_directive(), Some(Directive::CloseLink));
        assert_eq!(framer.next_deadline(), None);
        assert!(framer.buffered().is_empty());
    }

    #[rstest]
    #[case::error(true)]
    #[case::disconnect(false)]
    fn test_connection_loss_clears_buffer_without_stopping(#[case] as_error: bool) {
        let (mut framer, now) = open_framer(64, 0);
        framer.on_data(b"partial", now).unwrap();

        if as_error {
            framer.on_link_error(&Error::connection("device unplugged"));
        } else {
            framer.on_closed();
        }

        assert!(!framer.is_stopped());
        assert!(!framer.is_connected());
        assert!(!framer.accepts_intake());
        assert!(framer.buffered().is_empty());
        assert!(framer.watchdog().is_armed());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut framer, _) = open_framer(64, 30);
        framer.stop();
        framer.stop();
        assert_eq!(framer.poll_directive(), Some(Directive::CloseLink));
        assert_eq!(framer.poll_directive(), None);
        assert_eq!(framer.next_deadline(), None);
    }

    #[test]
    fn test_open_failure_retries_in_poll_mode() {
        let mut framer = StreamFramer::new(LineProtocol::default(), &settings(64, 5));
        let now = Instant::now();
        framer.start();
        framer.poll_directive();

        framer.on_open_failed(Error::connection("busy"), now).unwrap();
        assert_eq!(framer.next_deadline(), Some(now + Duration::from_secs(5)));

        let mut continuous = StreamFramer::new(LineProtocol::default(), &settings(64, 0));
        continuous.start();
        continuous.poll_directive();
        let result = continuous.on_open_failed(Error::connection("busy"), now);
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
        (result, logs)
    }

    #[rstest]
    #[case::pending(2, true)]
    #[case::nothing_queued(0, false)]
    fn test_pending_outbound_is_ignored(#[case] outbound: usize, #[case] warned: bool) {
        let mut protocol = LineProtocol::default();
        protocol.outbound = outbound;
        let mut framer = StreamFramer::new(protocol, &settings(64, 0));
        let now = Instant::now();
        framer.start();
        framer.poll_directive();
        framer.on_open(now);

        let (result, logs) = capture_logs(|| framer.on_data(b"x\n", now));
        result.unwrap();

        assert_eq!(framer.state(), FramerState::Listening);
        assert_eq!(framer.poll_directive(), None);
        assert_eq!(logs.contains("Link does not support sending"), warned, "{logs}");
        if warned {
            assert!(logs.contains("WARN"));
            assert!(logs.contains("pending=2"));
        }
    }
}
