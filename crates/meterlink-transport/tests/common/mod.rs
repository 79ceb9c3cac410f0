//! Shared fixtures for framer and session tests.

#![allow(dead_code)]

use meterlink_core::{FramerSettings, ObisCode};
use meterlink_protocol::sml::{ListEntry, SmlFileBuilder};

pub const ENERGY_IMPORT: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
pub const ACTIVE_POWER: ObisCode = ObisCode::new(1, 0, 16, 7, 0, 255);

/// Continuous mode unless `interval_secs` is non-zero.
pub fn settings(capacity: usize, timeout_ms: u64, interval_secs: u64) -> FramerSettings {
    FramerSettings {
        max_buffer_size: capacity,
        message_timeout_ms: timeout_ms,
        request_interval_secs: interval_secs,
    }
}

/// Complete SML file reporting `import` as the energy register.
pub fn meter_file(import: u64) -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(vec![
            ListEntry::new(ENERGY_IMPORT, import).unit(30).scaler(0),
            ListEntry::new(ACTIVE_POWER, 230i64).unit(27).scaler(0),
        ])
        .close_response()
        .build()
}

/// SML file whose first entry is a run of twelve escape bytes; the
/// encoded payload holds escaped marker words.
pub fn escaped_meter_file(import: u64) -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(vec![
            ListEntry::new(ObisCode::new(1, 0, 96, 1, 0, 255), &[0x1b; 12][..]),
            ListEntry::new(ENERGY_IMPORT, import).unit(30).scaler(0),
        ])
        .close_response()
        .build()
}

/// SML file whose only value list fails its CRC check.
pub fn corrupted_meter_file() -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(vec![ListEntry::new(ENERGY_IMPORT, 1u64).unit(30)])
        .with_invalid_crc()
        .close_response()
        .build()
}

/// Gateway billing document with a single import register.
pub fn efr_document(import: u64) -> Vec<u8> {
    format!(r#"{{"billingData:": {{"values": [{{"obis": "1-0:1.8.0", "value": {import}, "unit": "kWh"}}]}}}}"#)
        .into_bytes()
}
