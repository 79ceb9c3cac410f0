//! Meter protocol strategies.
//!
//! A [`ProtocolStrategy`] recognizes complete frames in an accumulated
//! receive buffer and decodes them into [`Measurements`]. Two strategies
//! ship with this crate:
//!
//! - [`SmlProtocol`]: binary Smart Message Language frames, escape
//!   delimited and CRC checked per message.
//! - [`JsonEfrProtocol`]: JSON billing documents.
//!
//! [`AnyProtocol`] selects one of them from configuration.
//!
//! [`Measurements`]: meterlink_core::Measurements

pub mod any;
pub mod json_efr;
pub mod protocol;
pub mod sink;
pub mod sml;

pub use any::AnyProtocol;
pub use json_efr::JsonEfrProtocol;
pub use protocol::{DecodedFrame, ProtocolStrategy};
pub use sink::{ChannelSink, MeasurementSink};
pub use sml::{
    SmlDecoder, SmlEntry, SmlFileBuilder, SmlFileDecoder, SmlList, SmlListKind, SmlProtocol,
    SmlValue,
};
