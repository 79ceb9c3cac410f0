//! Enum wrapper for protocol dispatch.
//!
//! [`AnyProtocol`] gives the transport a single concrete strategy type
//! chosen at runtime from configuration, so a session can be built without
//! knowing which meter protocol is in use.
//!
//! # Examples
//!
//! ```
//! use meterlink_core::{DebugLevel, Measurements, ProtocolKind, ProtocolSettings};
//! use meterlink_protocol::{AnyProtocol, ProtocolStrategy};
//!
//! let settings = ProtocolSettings {
//!     kind: ProtocolKind::JsonEfr,
//!     ..ProtocolSettings::default()
//! };
//! let protocol = AnyProtocol::from_settings(&settings, DebugLevel::Off, |_: &Measurements| {});
//! assert_eq!(protocol.name(), "json-efr");
//! ```

use meterlink_core::{DebugLevel, ProtocolKind, ProtocolSettings, Result};

use crate::json_efr::JsonEfrProtocol;
use crate::protocol::{DecodedFrame, ProtocolStrategy};
use crate::sink::MeasurementSink;
use crate::sml::SmlProtocol;

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyProtocol {
    /// Binary SML frames.
    Sml(SmlProtocol),
    /// EFR JSON billing documents.
    JsonEfr(JsonEfrProtocol),
}

impl AnyProtocol {
    /// Build the configured strategy delivering into `sink`.
    pub fn from_settings(
        settings: &ProtocolSettings,
        debug: DebugLevel,
        sink: impl MeasurementSink + 'static,
    ) -> Self {
        match settings.kind {
            ProtocolKind::Sml => Self::Sml(
                SmlProtocol::new(sink)
                    .ignore_invalid_crc(settings.sml_ignore_invalid_crc)
                    .debug(debug),
            ),
            ProtocolKind::JsonEfr => Self::JsonEfr(JsonEfrProtocol::new(sink).debug(debug)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::Sml(_) => ProtocolKind::Sml,
            Self::JsonEfr(_) => ProtocolKind::JsonEfr,
        }
    }
}

impl ProtocolStrategy for AnyProtocol {
    fn name(&self) -> &'static str {
        match self {
            Self::Sml(protocol) => protocol.name(),
            Self::JsonEfr(protocol) => protocol.name(),
        }
    }

    fn init_state(&mut self) {
        match self {
            Self::Sml(protocol) => protocol.init_state(),
            Self::JsonEfr(protocol) => protocol.init_state(),
        }
    }

    fn is_session_complete(&self) -> bool {
        match self {
            Self::Sml(protocol) => protocol.is_session_complete(),
            Self::JsonEfr(protocol) => protocol.is_session_complete(),
        }
    }

    fn pending_outbound_count(&self) -> usize {
        match self {
            Self::Sml(protocol) => protocol.pending_outbound_count(),
            Self::JsonEfr(protocol) => protocol.pending_outbound_count(),
        }
    }

    fn detect_complete_frame(&self, buffer: &[u8]) -> bool {
        match self {
            Self::Sml(protocol) => protocol.detect_complete_frame(buffer),
            Self::JsonEfr(protocol) => protocol.detect_complete_frame(buffer),
        }
    }

    fn decode_frame(&mut self, buffer: &[u8]) -> Result<DecodedFrame> {
        match self {
            Self::Sml(protocol) => protocol.decode_frame(buffer),
            Self::JsonEfr(protocol) => protocol.decode_frame(buffer),
        }
    }
}
