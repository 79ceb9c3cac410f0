//! Protocol strategy contract.
//!
//! The transport layer knows nothing about frame formats. It accumulates
//! bytes and asks the active strategy two questions:
//!
//! 1. Does the buffer end in a complete frame? ([`detect_complete_frame`])
//! 2. If so, decode it and hand back whatever bytes follow it. ([`decode_frame`])
//!
//! ```text
//! chunk ──> buffer ──detect?──no──> keep accumulating
//!                       │
//!                      yes
//!                       v
//!                  decode_frame ──> sink (non-empty results only)
//!                       │
//!                       v
//!                 leftover bytes ──> new buffer prefix
//! ```
//!
//! [`detect_complete_frame`]: ProtocolStrategy::detect_complete_frame
//! [`decode_frame`]: ProtocolStrategy::decode_frame

use meterlink_core::{Measurements, Result};

use crate::sink::MeasurementSink;

/// Outcome of a successful [`ProtocolStrategy::decode_frame`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFrame {
    /// Readings extracted from the frame; already delivered to the sink
    /// when non-empty.
    pub measurements: Measurements,

    /// Bytes that followed the decoded frame in the buffer, untouched.
    pub leftover: Vec<u8>,
}

/// Session lifecycle, frame detection and decoding for one meter protocol.
///
/// Implementations are receive-only unless [`pending_outbound_count`]
/// reports otherwise; session-scoped state is reset by [`init_state`] at
/// the start of every session and never persisted.
///
/// [`pending_outbound_count`]: ProtocolStrategy::pending_outbound_count
/// [`init_state`]: ProtocolStrategy::init_state
pub trait ProtocolStrategy {
    /// Short protocol name for logs.
    fn name(&self) -> &'static str;

    /// Clear session-scoped state; called once per new session.
    fn init_state(&mut self);

    /// Whether the logical exchange of this session is finished after the
    /// frame just handled.
    fn is_session_complete(&self) -> bool;

    /// Number of messages the protocol would like to transmit next.
    fn pending_outbound_count(&self) -> usize;

    /// Whether `buffer` (start to write cursor) ends in a structurally
    /// complete frame.
    ///
    /// Must not mutate state and never fails: malformed input surfaces
    /// only when [`decode_frame`](ProtocolStrategy::decode_frame) runs.
    fn detect_complete_frame(&self, buffer: &[u8]) -> bool;

    /// Decode the frame at the end of `buffer`, deliver non-empty results
    /// to the sink and return them together with any trailing bytes.
    ///
    /// # Errors
    /// - `Error::FrameDecode` when the frame cannot be parsed structurally.
    /// - `Error::Validity` when checksum validation fails and the
    ///   configuration does not tolerate it.
    fn decode_frame(&mut self, buffer: &[u8]) -> Result<DecodedFrame>;
}

/// Hand a result set to the sink when it carries data.
pub(crate) fn deliver(sink: &mut dyn MeasurementSink, measurements: &Measurements, verbose: bool) {
    if measurements.is_empty() {
        return;
    }
    if verbose {
        tracing::debug!(records = measurements.len(), "Store data");
    }
    sink.on_measurements(measurements);
}
