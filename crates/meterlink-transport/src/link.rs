//! Byte-stream link abstraction.

use meterlink_core::Result;

/// An ordered, receive-oriented byte stream that can be opened and closed
/// repeatedly.
///
/// Uses native `async fn` in traits; dispatch over several link kinds goes
/// through [`AnyLink`](crate::AnyLink) rather than trait objects.
///
/// `read` must be cancel safe: when the future is dropped before
/// completion no bytes may be lost.
pub trait Link {
    /// Open the link. Opening an already open link is a no-op.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the underlying device cannot be opened.
    async fn open(&mut self) -> Result<()>;

    /// Close the link. Closing a closed link is a no-op.
    ///
    /// # Errors
    /// Returns `Error::Connection` if the device reports a failure on close.
    async fn close(&mut self) -> Result<()>;

    /// Read available bytes into `buf`.
    ///
    /// Returns the number of bytes read; `0` means the peer disconnected.
    ///
    /// # Errors
    /// Returns `Error::Connection` on link failures.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn is_open(&self) -> bool;

    /// Whether the link can transmit. Shipped links are receive-only.
    fn can_send(&self) -> bool {
        false
    }

    /// Human readable description for logs.
    fn describe(&self) -> String;
}
