//! Enum wrapper for link dispatch.
//!
//! Native `async fn` in traits is not object safe, so `Box<dyn Link>` is
//! not available. [`AnyLink`] gives the CLI and embedding applications a
//! single concrete link type chosen at runtime.

use meterlink_core::Result;

use crate::Link;
use crate::mock::MockLink;
use crate::serial::SerialLink;

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLink {
    /// Hardware serial port.
    Serial(SerialLink),
    /// In-memory link for tests and replays.
    Mock(MockLink),
}

impl Link for AnyLink {
    async fn open(&mut self) -> Result<()> {
        match self {
            Self::Serial(link) => link.open().await,
            Self::Mock(link) => link.open().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Serial(link) => link.close().await,
            Self::Mock(link) => link.close().await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Serial(link) => link.read(buf).await,
            Self::Mock(link) => link.read(buf).await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Serial(link) => link.is_open(),
            Self::Mock(link) => link.is_open(),
        }
    }

    fn can_send(&self) -> bool {
        match self {
            Self::Serial(link) => link.can_send(),
            Self::Mock(link) => link.can_send(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Serial(link) => link.describe(),
            Self::Mock(link) => link.describe(),
        }
    }
}

impl From<SerialLink> for AnyLink {
    fn from(link: SerialLink) -> Self {
        Self::Serial(link)
    }
}

impl From<MockLink> for AnyLink {
    fn from(link: MockLink) -> Self {
        Self::Mock(link)
    }
}
