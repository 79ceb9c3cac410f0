//! Smart Message Language (SML) over the escape-delimited transport.
//!
//! A frame on the wire:
//!
//! ```text
//! 1b1b1b1b 01010101 | messages .. 00-padding | 1b1b1b1b 1a NN C1 C2
//!  start escape     | escaped payload        | end escape, pad count, file CRC
//! ```
//!
//! Each message inside the payload carries its own CRC-16/X-25. Only
//! current-value lists (`GetListResponse`) and profile periods
//! (`GetProfileListResponse`) contribute readings; everything else is
//! parsed and dropped.

mod builder;
mod codec;
pub mod framing;
mod tl;
pub mod units;

pub use builder::{ListEntry, SmlFileBuilder};
pub use codec::{SmlDecoder, SmlEntry, SmlFileDecoder, SmlList, SmlListKind};
pub use tl::SmlValue;

use meterlink_core::{DebugLevel, Error, Measurements, Result};

use crate::protocol::{DecodedFrame, ProtocolStrategy, deliver};
use crate::sink::MeasurementSink;

/// Receive-only SML strategy.
///
/// Every decoded frame completes the session. Frames whose interpreted
/// lists all fail the checksum are rejected with `Error::Validity` unless
/// [`ignore_invalid_crc`](Self::ignore_invalid_crc) is set.
pub struct SmlProtocol<D: SmlDecoder = SmlFileDecoder> {
    decoder: D,
    sink: Box<dyn MeasurementSink>,
    ignore_invalid_crc: bool,
    debug: DebugLevel,
}

impl SmlProtocol<SmlFileDecoder> {
    pub fn new(sink: impl MeasurementSink + 'static) -> Self {
        Self::with_decoder(SmlFileDecoder::new(), sink)
    }
}

impl<D: SmlDecoder> SmlProtocol<D> {
    /// Use a custom structural decoder.
    pub fn with_decoder(decoder: D, sink: impl MeasurementSink + 'static) -> Self {
        Self {
            decoder,
            sink: Box::new(sink),
            ignore_invalid_crc: false,
            debug: DebugLevel::Off,
        }
    }

    /// Accept frames whose checksums fail instead of erroring.
    #[must_use]
    pub fn ignore_invalid_crc(mut self, ignore: bool) -> Self {
        self.ignore_invalid_crc = ignore;
        self
    }

    #[must_use]
    pub fn debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    /// Merge the interpreted lists; returns the readings and whether every
    /// interpreted list passed its checksum.
    fn collect(&self, lists: &[SmlList]) -> (Measurements, bool) {
        let mut measurements = Measurements::new();
        let mut crc_ok = true;

        for list in lists.iter().filter(|list| list.kind.is_interpreted()) {
            crc_ok &= list.valid;
            if !list.valid {
                if self.debug.reports_errors() {
                    tracing::debug!(kind = ?list.kind, entries = list.entries.len(), "Skipping list with invalid CRC");
                }
                continue;
            }
            for entry in &list.entries {
                measurements.record(&entry.id, entry.scaled_value(), &entry.unit);
            }
        }

        (measurements, crc_ok)
    }
}

impl<D: SmlDecoder> ProtocolStrategy for SmlProtocol<D> {
    fn name(&self) -> &'static str {
        "sml"
    }

    fn init_state(&mut self) {}

    fn is_session_complete(&self) -> bool {
        true
    }

    fn pending_outbound_count(&self) -> usize {
        0
    }

    fn detect_complete_frame(&self, buffer: &[u8]) -> bool {
        framing::ends_with_complete_frame(buffer)
    }

    fn decode_frame(&mut self, buffer: &[u8]) -> Result<DecodedFrame> {
        let span = framing::locate_frame(buffer)
            .ok_or_else(|| Error::frame_decode("No complete SML frame in buffer"))?;
        let frame = &buffer[span.clone()];

        if self.debug.is_verbose() {
            tracing::debug!(
                offset = span.start,
                len = frame.len(),
                file_crc_ok = SmlFileDecoder::file_crc_valid(frame),
                "Decoding SML frame"
            );
        }

        let lists = self.decoder.decode(frame)?;
        let (measurements, crc_ok) = self.collect(&lists);

        if measurements.is_empty() && !crc_ok {
            if !self.ignore_invalid_crc {
                return Err(Error::validity("SML checksum validation failed"));
            }
            tracing::warn!(protocol = "sml", "Checksum validation failed, frame ignored");
        }

        deliver(self.sink.as_mut(), &measurements, self.debug.is_verbose());

        Ok(DecodedFrame {
            measurements,
            leftover: buffer[span.end..].to_vec(),
        })
    }
}

impl<D: SmlDecoder + std::fmt::Debug> std::fmt::Debug for SmlProtocol<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmlProtocol")
            .field("decoder", &self.decoder)
            .field("ignore_invalid_crc", &self.ignore_invalid_crc)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
