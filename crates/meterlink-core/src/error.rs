use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame errors
    #[error("Frame decode error: {0}")]
    FrameDecode(String),

    #[error("Validity check failed: {0}")]
    Validity(String),

    // Session errors
    #[error("Maximal buffer size of {capacity} bytes reached without matching frame")]
    BufferOverflow { capacity: usize },

    #[error("No or too long message from device (watchdog {timeout_ms}ms)")]
    Timeout { timeout_ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a frame decode error.
    pub fn frame_decode(message: impl Into<String>) -> Self {
        Self::FrameDecode(message.into())
    }

    /// Create a validity (checksum) error.
    pub fn validity(message: impl Into<String>) -> Self {
        Self::Validity(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Returns `true` for decode failures that only ended the current
    /// session. The transport is still running and can be driven again.
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::FrameDecode(_) | Self::Validity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
