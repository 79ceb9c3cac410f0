//! Async driver running a [`StreamFramer`] over a [`Link`].

use meterlink_core::constants::READ_CHUNK_SIZE;
use meterlink_core::{DebugLevel, Error, FramerSettings, Result};
use meterlink_protocol::ProtocolStrategy;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Link;
use crate::framer::{Directive, StreamFramer};

/// Sleep target used when no timer is armed; the branch is disabled then.
const IDLE_SLEEP: Duration = Duration::from_secs(86_400);

/// One meter link under supervision.
///
/// [`run`](Self::run) multiplexes three event sources with `tokio::select!`:
///
/// 1. cancellation (graceful stop),
/// 2. the framer's earliest timer deadline,
/// 3. link reads, enabled only while the framer is listening.
///
/// A frame is decoded synchronously inside the read branch, so no further
/// bytes are read while it is handled.
///
/// # Examples
///
/// ```no_run
/// use meterlink_core::{FramerSettings, Measurements, SerialSettings};
/// use meterlink_protocol::SmlProtocol;
/// use meterlink_transport::{MeterSession, SerialLink};
///
/// # async fn example() -> meterlink_core::Result<()> {
/// let link = SerialLink::new(SerialSettings {
///     port: "/dev/ttyUSB0".to_string(),
///     ..SerialSettings::default()
/// });
/// let protocol = SmlProtocol::new(|set: &Measurements| println!("{set:?}"));
///
/// let mut session = MeterSession::new(link, protocol, FramerSettings::default());
/// session.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MeterSession<L, P> {
    link: L,
    framer: StreamFramer<P>,
    cancel: CancellationToken,
    debug: DebugLevel,
    read_buf: Vec<u8>,
}

impl<L: Link, P: ProtocolStrategy> MeterSession<L, P> {
    pub fn new(link: L, protocol: P, settings: FramerSettings) -> Self {
        let framer = StreamFramer::new(protocol, &settings).can_send(link.can_send());
        Self {
            link,
            framer,
            cancel: CancellationToken::new(),
            debug: DebugLevel::Off,
            read_buf: vec![0; READ_CHUNK_SIZE],
        }
    }

    #[must_use]
    pub fn debug(mut self, level: DebugLevel) -> Self {
        self.framer = self.framer.debug(level);
        self.debug = level;
        self
    }

    /// Stop when `token` is cancelled instead of the session's own token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops [`run`](Self::run) gracefully when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn framer(&self) -> &StreamFramer<P> {
        &self.framer
    }

    #[must_use]
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Drive the link until cancelled or a fatal error occurs.
    ///
    /// # Errors
    /// - `Error::BufferOverflow` / `Error::Timeout`: the transport stopped.
    /// - `Error::FrameDecode` / `Error::Validity`: the session was torn down.
    /// - `Error::Connection` / `Error::Config`: the link could not be opened
    ///   and no retry is scheduled.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            link = %self.link.describe(),
            protocol = self.framer.protocol().name(),
            "Starting meter session"
        );
        self.framer.start();

        loop {
            if let Err(error) = self.apply_directives().await {
                self.settle().await;
                return Err(error);
            }
            if self.framer.is_stopped() {
                return Ok(());
            }

            let deadline = self.framer.next_deadline();
            let intake = self.framer.accepts_intake();
            if deadline.is_none() && !intake {
                return Err(Error::connection(format!(
                    "{} closed with no reopen scheduled",
                    self.link.describe()
                )));
            }
            let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_SLEEP);

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("Meter session cancelled");
                    self.shutdown().await;
                    return Ok(());
                }

                () = sleep_until(wake_at), if deadline.is_some() => {
                    if let Err(error) = self.framer.poll_timers(Instant::now()) {
                        self.settle().await;
                        return Err(error);
                    }
                }

                result = self.link.read(&mut self.read_buf), if intake => {
                    match result {
                        Ok(0) => {
                            if self.debug.reports_errors() {
                                warn!(link = %self.link.describe(), "Link disconnected");
                            }
                            self.framer.on_closed();
                        }
                        Ok(n) => {
                            let chunk = &self.read_buf[..n];
                            if let Err(error) = self.framer.on_data(chunk, Instant::now()) {
                                self.settle().await;
                                return Err(error);
                            }
                        }
                        Err(error) => self.framer.on_link_error(&error),
                    }
                }
            }
        }
    }

    async fn apply_directives(&mut self) -> Result<()> {
        while let Some(directive) = self.framer.poll_directive() {
            match directive {
                Directive::OpenLink => match self.link.open().await {
                    Ok(()) => self.framer.on_open(Instant::now()),
                    Err(error) => self.framer.on_open_failed(error, Instant::now())?,
                },
                Directive::CloseLink => {
                    if let Err(error) = self.link.close().await
                        && self.debug.reports_errors()
                    {
                        warn!(error = %error, "Failed to close link");
                    }
                    self.framer.on_closed();
                }
            }
        }
        Ok(())
    }

    /// Stop the framer and release the link.
    async fn shutdown(&mut self) {
        self.framer.stop();
        self.settle().await;
    }

    /// Apply outstanding directives after a failure and make sure the link
    /// ends up closed.
    async fn settle(&mut self) {
        if self.apply_directives().await.is_err() {
            debug!("Ignoring link error while closing session");
        }
        if self.link.is_open() {
            if let Err(error) = self.link.close().await {
                debug!(error = %error, "Ignoring close failure");
            }
            self.framer.on_closed();
        }
    }
}
