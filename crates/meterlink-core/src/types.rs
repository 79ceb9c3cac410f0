use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// OBIS object identifier (IEC 62056-61), six value groups `A-B:C.D.E*F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    /// Value group F meaning "not used".
    pub const F_UNUSED: u8 = 255;

    /// Create an OBIS code from its six value groups.
    #[must_use]
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Build an OBIS code from the 6-byte object name used on the wire.
    ///
    /// Returns `None` if the slice is not exactly six bytes long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match *bytes {
            [a, b, c, d, e, f] => Some(Self::new(a, b, c, d, e, f)),
            _ => None,
        }
    }

    /// Raw 6-byte representation.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}", self.a, self.b, self.c, self.d, self.e)?;
        if self.f != Self::F_UNUSED {
            write!(f, "*{}", self.f)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ObisCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::frame_decode(format!("Invalid OBIS code: {s}"));
        let group = |part: &str| part.trim().parse::<u8>().map_err(|_| invalid());

        let (medium, rest) = s.split_once('-').ok_or_else(invalid)?;
        let (channel, rest) = rest.split_once(':').ok_or_else(invalid)?;
        let (cde, f) = match rest.split_once('*') {
            Some((cde, f)) => (cde, group(f)?),
            None => (rest, Self::F_UNUSED),
        };

        let mut parts = cde.split('.');
        let (Some(c), Some(d), Some(e), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self::new(group(medium)?, group(channel)?, group(c)?, group(d)?, group(e)?, f))
    }
}

/// Value of a single reading: numeric or textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl ReadingValue {
    /// Apply a power-of-ten scaler to numeric values; text passes through.
    ///
    /// Negative scalers divide by the exact power of ten so that values such
    /// as `12345 * 10^-1` come out as `1234.5`.
    #[must_use]
    pub fn scaled(self, scaler: i8) -> Self {
        match self {
            Self::Number(value) if scaler >= 0 => {
                Self::Number(value * 10f64.powi(i32::from(scaler)))
            }
            Self::Number(value) => Self::Number(value / 10f64.powi(-i32::from(scaler))),
            text => text,
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for ReadingValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for ReadingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ReadingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// One `(value, unit)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: ReadingValue,
    /// Unit symbol, empty when the source carries none.
    pub unit: String,
}

impl Reading {
    #[must_use]
    pub fn new(value: impl Into<ReadingValue>, unit: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            unit: unit.into(),
        }
    }
}

/// All readings of one identifier found in a single frame.
///
/// Readings are kept in decode order and never deduplicated; a frame may
/// legitimately carry several readings for the same identifier (for
/// example one per billing period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    id: String,
    readings: Vec<Reading>,
}

impl MeasurementRecord {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            readings: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Append a reading.
    pub fn add_value(&mut self, value: impl Into<ReadingValue>, unit: impl Into<String>) {
        self.readings.push(Reading::new(value, unit));
    }

    /// The first reading, which is the only one for most identifiers.
    #[must_use]
    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }
}

/// Result set of one decoded frame: identifier to record.
///
/// Built fresh for every frame. Each identifier maps to exactly one
/// record aggregating every reading of that identifier in the frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurements(BTreeMap<String, MeasurementRecord>);

impl Measurements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one reading into the record for `id`, creating it if needed.
    pub fn record(&mut self, id: impl Into<String>, value: impl Into<ReadingValue>, unit: impl Into<String>) {
        let id = id.into();
        self.0
            .entry(id.clone())
            .or_insert_with(|| MeasurementRecord::new(id))
            .add_value(value, unit);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&MeasurementRecord> {
        self.0.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementRecord> {
        self.0.values()
    }
}

impl IntoIterator for Measurements {
    type Item = MeasurementRecord;
    type IntoIter = btree_map::IntoValues<String, MeasurementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}
