//! Configuration for a meter collection session.
//!
//! Every option has a default matching common D0/SML optical heads, so an
//! empty document (or `MeterConfig::default()`) is a working configuration
//! apart from the serial port path.
//!
//! ```
//! use meterlink_core::{MeterConfig, ProtocolKind};
//!
//! let config: MeterConfig = toml::from_str(r#"
//!     [serial]
//!     port = "/dev/ttyUSB0"
//!
//!     [protocol]
//!     kind = "sml"
//! "#).unwrap();
//!
//! assert_eq!(config.serial.baud_rate, 9600);
//! assert_eq!(config.protocol.kind, ProtocolKind::Sml);
//! assert!(config.validate().is_ok());
//! ```

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MESSAGE_TIMEOUT_MS,
    DEFAULT_REQUEST_INTERVAL_SECS, DEFAULT_STOP_BITS,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Complete configuration of one meter link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub serial: SerialSettings,
    pub framer: FramerSettings,
    pub protocol: ProtocolSettings,
    pub debug: DebugLevel,
}

impl MeterConfig {
    /// Check value ranges that the type system cannot express.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be greater than 0".to_string()));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(Error::Config(format!(
                "data_bits must be 5-8, got {}",
                self.serial.data_bits
            )));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(Error::Config(format!(
                "stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            )));
        }
        if self.framer.max_buffer_size == 0 {
            return Err(Error::Config("max_buffer_size must be greater than 0".to_string()));
        }
        if self.framer.message_timeout_ms == 0 {
            return Err(Error::Config("message_timeout_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: DEFAULT_STOP_BITS,
            parity: Parity::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Receive buffer and session timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramerSettings {
    /// Receive buffer capacity in bytes.
    pub max_buffer_size: usize,
    /// Watchdog timeout in milliseconds.
    pub message_timeout_ms: u64,
    /// Poll interval in seconds; `0` reads continuously without reopening.
    pub request_interval_secs: u64,
}

impl FramerSettings {
    #[must_use]
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    /// Delay before reopening the link, `None` in continuous mode.
    #[must_use]
    pub fn request_interval(&self) -> Option<Duration> {
        (self.request_interval_secs > 0).then(|| Duration::from_secs(self.request_interval_secs))
    }
}

impl Default for FramerSettings {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
            request_interval_secs: DEFAULT_REQUEST_INTERVAL_SECS,
        }
    }
}

/// Protocol selection and protocol-specific options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub kind: ProtocolKind,
    /// Accept SML frames whose interpreted lists all fail their CRC check
    /// (logged, no data delivered) instead of failing the session.
    pub sml_ignore_invalid_crc: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    /// Binary Smart Message Language frames.
    #[default]
    Sml,
    /// JSON billing documents (EFR smart meter gateways).
    JsonEfr,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolKind::Sml => write!(f, "sml"),
            ProtocolKind::JsonEfr => write!(f, "json-efr"),
        }
    }
}

impl std::str::FromStr for ProtocolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sml" => Ok(ProtocolKind::Sml),
            "json-efr" | "jsonefr" | "efr" => Ok(ProtocolKind::JsonEfr),
            _ => Err(Error::Config(format!("Unknown protocol: {s}"))),
        }
    }
}

/// Diagnostic verbosity of the collection core.
///
/// Encoded as `0`, `1` or `2` in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DebugLevel {
    /// Only fatal conditions, which are returned as errors anyway.
    #[default]
    Off,
    /// Link errors and tolerated checksum failures.
    Errors,
    /// Per-frame diagnostics: buffer sizes, matches, leftovers.
    Verbose,
}

impl DebugLevel {
    #[must_use]
    pub fn reports_errors(self) -> bool {
        self >= DebugLevel::Errors
    }

    #[must_use]
    pub fn is_verbose(self) -> bool {
        self == DebugLevel::Verbose
    }
}

impl TryFrom<u8> for DebugLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DebugLevel::Off),
            1 => Ok(DebugLevel::Errors),
            2 => Ok(DebugLevel::Verbose),
            _ => Err(Error::Config(format!("debug level must be 0-2, got {value}"))),
        }
    }
}

impl From<DebugLevel> for u8 {
    fn from(level: DebugLevel) -> Self {
        match level {
            DebugLevel::Off => 0,
            DebugLevel::Errors => 1,
            DebugLevel::Verbose => 2,
        }
    }
}
