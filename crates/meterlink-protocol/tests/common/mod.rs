//! Shared helpers for protocol integration tests.
//!
//! - `RecordingSink` captures every delivered measurement set.
//! - `meter_file` / `corrupted_meter_file` / `escaped_meter_file` build
//!   realistic SML files.
//! - `capture_logs` runs a closure under an in-memory tracing subscriber.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use meterlink_core::{Measurements, ObisCode};
use meterlink_protocol::MeasurementSink;
use meterlink_protocol::sml::{ListEntry, SmlFileBuilder};

pub const ENERGY_IMPORT: ObisCode = ObisCode::new(1, 0, 1, 8, 0, 255);
pub const ENERGY_EXPORT: ObisCode = ObisCode::new(1, 0, 2, 8, 0, 255);
pub const ACTIVE_POWER: ObisCode = ObisCode::new(1, 0, 16, 7, 0, 255);

/// Sink recording every set it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sets: Arc<Mutex<Vec<Measurements>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.sets.lock().unwrap().len()
    }

    pub fn sets(&self) -> Vec<Measurements> {
        self.sets.lock().unwrap().clone()
    }
}

impl MeasurementSink for RecordingSink {
    fn on_measurements(&mut self, measurements: &Measurements) {
        self.sets.lock().unwrap().push(measurements.clone());
    }
}

/// Current values a typical household meter reports.
pub fn household_entries() -> Vec<ListEntry> {
    vec![
        ListEntry::new(ObisCode::new(1, 0, 96, 50, 1, 1), "EMH"),
        ListEntry::new(ENERGY_IMPORT, 123_456_789u64).unit(30).scaler(-1),
        ListEntry::new(ENERGY_EXPORT, 4_200u64).unit(30).scaler(-1),
        ListEntry::new(ACTIVE_POWER, 512i64).unit(27).scaler(0),
    ]
}

/// Open, current values, close: a complete meter file.
pub fn meter_file() -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(household_entries())
        .close_response()
        .build()
}

/// Like [`meter_file`] but the value list fails its CRC check.
pub fn corrupted_meter_file() -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(household_entries())
        .with_invalid_crc()
        .close_response()
        .build()
}

pub const DEVICE_TAG: ObisCode = ObisCode::new(1, 0, 96, 1, 0, 255);

/// Meter file whose device tag is a run of twelve escape bytes, so the
/// encoded payload holds escaped marker words.
pub fn escaped_meter_file() -> Vec<u8> {
    SmlFileBuilder::new()
        .open_response()
        .get_list_response(vec![
            ListEntry::new(DEVICE_TAG, &[0x1b; 12][..]),
            ListEntry::new(ENERGY_IMPORT, 500u64).unit(30),
        ])
        .close_response()
        .build()
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a tracing subscriber writing into memory; returns the
/// closure result and the captured log text.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
