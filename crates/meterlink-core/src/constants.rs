//! Core constants for meter data collection.
//!
//! This module groups the protocol-level byte patterns of the SML transport
//! layer together with the default values of every configuration knob, so
//! protocol code, transport code and configuration loading agree on them.
//!
//! # SML Transport Escapes
//!
//! SML files travel on the serial line wrapped in escape sequences:
//!
//! ```text
//! 1b1b1b1b 01010101  <messages ... padding>  1b1b1b1b 1a NN C1 C2
//! |-- start escape --|                        |-- end escape + trailer --|
//! ```
//!
//! Where:
//! - `NN` - number of padding bytes inserted before the end escape
//! - `C1 C2` - CRC-16 over the whole file up to and including `NN`
//!
//! # Usage
//!
//! ```
//! use meterlink_core::constants::*;
//!
//! assert_eq!(SML_START_ESCAPE.len(), 8);
//! assert_eq!(DEFAULT_MAX_BUFFER_SIZE, 300_000);
//! ```

// ============================================================================
// SML Framing
// ============================================================================

/// Marker byte repeated to form every escape sequence.
pub const SML_ESCAPE_BYTE: u8 = 0x1b;

/// Four marker bytes; prefix of every escape sequence.
pub const SML_ESCAPE: [u8; 4] = [SML_ESCAPE_BYTE; 4];

/// Sub-marker byte of the start escape.
pub const SML_START_BYTE: u8 = 0x01;

/// Complete start escape: four marker bytes followed by four sub-markers.
pub const SML_START_ESCAPE: [u8; 8] = [
    SML_ESCAPE_BYTE,
    SML_ESCAPE_BYTE,
    SML_ESCAPE_BYTE,
    SML_ESCAPE_BYTE,
    SML_START_BYTE,
    SML_START_BYTE,
    SML_START_BYTE,
    SML_START_BYTE,
];

/// First trailer byte following the end escape.
pub const SML_END_MARKER: u8 = 0x1a;

/// Length of the trailer after the end escape (`1a NN C1 C2`).
pub const SML_TRAILER_LEN: usize = 4;

/// Smallest possible frame: start escape directly followed by end escape and trailer.
pub const SML_MIN_FRAME_LEN: usize =
    SML_START_ESCAPE.len() + SML_ESCAPE.len() + SML_TRAILER_LEN;

/// Message body tag of a `GetListResponse` (current values).
pub const SML_GET_LIST_RESPONSE: u32 = 0x0000_0701;

/// Message body tag of a `GetProfileListResponse` (period values).
pub const SML_GET_PROFILE_LIST_RESPONSE: u32 = 0x0000_0401;

/// Key holding the billing sub-structures in EFR JSON documents.
///
/// The trailing colon is part of the key as emitted by the devices.
pub const EFR_BILLING_KEY: &str = "billingData:";

// ============================================================================
// Serial Defaults
// ============================================================================

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default number of data bits per character.
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Default number of stop bits.
pub const DEFAULT_STOP_BITS: u8 = 1;

/// Read chunk size used when pulling bytes from a link.
pub const READ_CHUNK_SIZE: usize = 2048;

// ============================================================================
// Framer Defaults
// ============================================================================

/// Default receive buffer capacity in bytes.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 300_000;

/// Default watchdog timeout in milliseconds (2 minutes).
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 120_000;

/// Default poll interval in seconds; `0` selects continuous mode.
pub const DEFAULT_REQUEST_INTERVAL_SECS: u64 = 0;
