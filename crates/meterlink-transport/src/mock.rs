//! Mock link for testing and replaying captured meter output.
//!
//! The link side implements [`Link`]; the [`MockLinkHandle`] side feeds it
//! chunks, errors and disconnects through a channel and observes how often
//! the link was opened and closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::{Buf, Bytes};
use meterlink_core::{Error, Result};
use tokio::sync::mpsc;

use crate::Link;

/// Event delivered from the handle to the link.
#[derive(Debug, Clone)]
enum LinkEvent {
    Data(Bytes),
    Error(String),
    Disconnect,
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_open: AtomicBool,
}

/// In-memory link fed by a [`MockLinkHandle`].
///
/// Events queue up while the link is closed and are read after the next
/// open. Chunks larger than the read buffer are handed out in pieces.
///
/// # Examples
///
/// ```
/// use meterlink_transport::Link;
/// use meterlink_transport::mock::MockLink;
///
/// #[tokio::main]
/// async fn main() -> meterlink_core::Result<()> {
///     let (mut link, handle) = MockLink::new();
///     link.open().await?;
///
///     handle.send(b"hello".to_vec()).await?;
///
///     let mut buf = [0u8; 16];
///     let n = link.read(&mut buf).await?;
///     assert_eq!(&buf[..n], b"hello");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockLink {
    event_rx: mpsc::Receiver<LinkEvent>,
    pending: Bytes,
    open: bool,
    name: String,
    counters: Arc<Counters>,
}

impl MockLink {
    /// Create a link and the handle controlling it.
    pub fn new() -> (Self, MockLinkHandle) {
        Self::with_name("mock")
    }

    pub fn with_name(name: impl Into<String>) -> (Self, MockLinkHandle) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let counters = Arc::new(Counters::default());

        let link = Self {
            event_rx,
            pending: Bytes::new(),
            open: false,
            name: name.into(),
            counters: Arc::clone(&counters),
        };
        let handle = MockLinkHandle { event_tx, counters };

        (link, handle)
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        n
    }
}

impl Link for MockLink {
    async fn open(&mut self) -> Result<()> {
        if self.counters.fail_open.load(Ordering::SeqCst) {
            return Err(Error::connection(format!("{}: open refused", self.name)));
        }
        if !self.open {
            self.open = true;
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::connection(format!("{} is not open", self.name)));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.event_rx.recv().await {
                Some(LinkEvent::Data(bytes)) => self.pending = bytes,
                Some(LinkEvent::Error(message)) => return Err(Error::connection(message)),
                Some(LinkEvent::Disconnect) | None => {
                    self.open = false;
                    return Ok(0);
                }
            }
        }

        Ok(self.take_pending(buf))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Controls a [`MockLink`].
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    event_tx: mpsc::Sender<LinkEvent>,
    counters: Arc<Counters>,
}

impl MockLinkHandle {
    /// Deliver a chunk of bytes.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the link has been dropped.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.push(LinkEvent::Data(data.into())).await
    }

    /// Deliver `data` split into chunks of at most `chunk_size` bytes.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the link has been dropped.
    pub async fn send_chunked(&self, data: &[u8], chunk_size: usize) -> Result<()> {
        for chunk in data.chunks(chunk_size.max(1)) {
            self.send(Bytes::copy_from_slice(chunk)).await?;
        }
        Ok(())
    }

    /// Make the next read fail with a connection error.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the link has been dropped.
    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.push(LinkEvent::Error(message.into())).await
    }

    /// Simulate the device going away.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the link has been dropped.
    pub async fn disconnect(&self) -> Result<()> {
        self.push(LinkEvent::Disconnect).await
    }

    /// Refuse subsequent open attempts.
    pub fn refuse_open(&self, refuse: bool) {
        self.counters.fail_open.store(refuse, Ordering::SeqCst);
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    async fn push(&self, event: LinkEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| Error::connection("Mock link dropped"))
    }
}
