//! Structural SML decoding.
//!
//! [`SmlDecoder`] is the seam between frame handling and the inner SML
//! structure: given the bytes of one complete frame it returns the typed
//! sub-lists with their checksum verdicts. [`SmlFileDecoder`] is the
//! built-in implementation.

use crc::{CRC_16_IBM_SDLC, Crc};
use meterlink_core::constants::{
    SML_END_MARKER, SML_ESCAPE, SML_GET_LIST_RESPONSE, SML_GET_PROFILE_LIST_RESPONSE,
    SML_START_ESCAPE, SML_TRAILER_LEN,
};
use meterlink_core::{Error, ObisCode, ReadingValue, Result};

use super::framing::unescape;
use super::tl::{END_OF_MESSAGE, SmlValue, TlReader};
use super::units::unit_symbol;

/// CRC-16/X-25 as used for SML messages and files.
pub(crate) const SML_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Element counts of the structures interpreted by the decoder.
const MESSAGE_FIELDS: usize = 6;
const LIST_ENTRY_FIELDS: usize = 7;
const PERIOD_ENTRY_FIELDS: usize = 5;
const GET_LIST_VAL_LIST: usize = 4;
const PROFILE_PERIOD_LIST: usize = 6;

/// Kind of an SML message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmlListKind {
    /// `GetListResponse`: current register values.
    CurrentValues,
    /// `GetProfileListResponse`: values of one profile period.
    Profile,
    /// Any other message body, identified by its tag.
    Other(u32),
}

impl SmlListKind {
    #[must_use]
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            SML_GET_LIST_RESPONSE => Self::CurrentValues,
            SML_GET_PROFILE_LIST_RESPONSE => Self::Profile,
            other => Self::Other(other),
        }
    }

    /// Whether the collector extracts readings from this kind.
    #[must_use]
    pub fn is_interpreted(self) -> bool {
        matches!(self, Self::CurrentValues | Self::Profile)
    }
}

/// One value entry of an SML list.
#[derive(Debug, Clone, PartialEq)]
pub struct SmlEntry {
    pub id: String,
    pub value: ReadingValue,
    pub unit: String,
    /// Power-of-ten scaler, if the entry carries one.
    pub scaler: Option<i8>,
}

impl SmlEntry {
    /// Value with the scaler applied.
    #[must_use]
    pub fn scaled_value(&self) -> ReadingValue {
        match self.scaler {
            Some(scaler) => self.value.clone().scaled(scaler),
            None => self.value.clone(),
        }
    }
}

/// A typed sub-list of a frame with its own checksum verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct SmlList {
    pub kind: SmlListKind,
    pub valid: bool,
    pub entries: Vec<SmlEntry>,
}

/// Structural decoder for a single complete SML frame.
pub trait SmlDecoder {
    /// Decode `frame` (start escape through trailer) into its sub-lists.
    ///
    /// # Errors
    /// Returns `Error::FrameDecode` if the frame structure is malformed.
    fn decode(&self, frame: &[u8]) -> Result<Vec<SmlList>>;
}

/// Decoder for SML 1.04 files in transport protocol version 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmlFileDecoder;

impl SmlFileDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether the whole-file CRC in the trailer matches.
    ///
    /// The collector does not act on this; per-message checksums decide.
    #[must_use]
    pub fn file_crc_valid(frame: &[u8]) -> bool {
        let len = frame.len();
        if len < SML_START_ESCAPE.len() + SML_ESCAPE.len() + SML_TRAILER_LEN {
            return false;
        }
        let stored = u16::from_le_bytes([frame[len - 2], frame[len - 1]]);
        SML_CRC.checksum(&frame[..len - 2]) == stored
    }
}

impl SmlDecoder for SmlFileDecoder {
    fn decode(&self, frame: &[u8]) -> Result<Vec<SmlList>> {
        let payload = file_payload(frame)?;
        let mut reader = TlReader::new(&payload);
        let mut lists = Vec::new();

        while !reader.is_empty() {
            // Padding and stray end-of-message markers between messages
            if reader.peek() == Some(END_OF_MESSAGE) {
                reader.skip(1);
                continue;
            }
            lists.push(read_message(&mut reader)?);
        }

        Ok(lists)
    }
}

/// Unescaped message bytes between start escape and end escape.
fn file_payload(frame: &[u8]) -> Result<Vec<u8>> {
    let len = frame.len();
    let min_len = SML_START_ESCAPE.len() + SML_ESCAPE.len() + SML_TRAILER_LEN;
    if len < min_len || frame[..SML_START_ESCAPE.len()] != SML_START_ESCAPE {
        return Err(Error::frame_decode("Frame does not begin with a start escape"));
    }
    let end_escape_at = len - SML_TRAILER_LEN - SML_ESCAPE.len();
    if frame[end_escape_at..end_escape_at + SML_ESCAPE.len()] != SML_ESCAPE
        || frame[end_escape_at + SML_ESCAPE.len()] != SML_END_MARKER
    {
        return Err(Error::frame_decode("Frame does not end with an end escape"));
    }
    Ok(unescape(&frame[SML_START_ESCAPE.len()..end_escape_at]))
}

fn read_message(reader: &mut TlReader<'_>) -> Result<SmlList> {
    let start = reader.position();
    let fields = reader.read_list_header()?;
    if fields < MESSAGE_FIELDS - 1 {
        return Err(Error::frame_decode(format!(
            "SML message at offset {start} has {fields} fields"
        )));
    }

    let _transaction_id = reader.read_value()?;
    let _group_no = reader.read_value()?;
    let _abort_on_error = reader.read_value()?;
    let body = reader.read_value()?;

    let crc_at = reader.position();
    let stored_crc = reader
        .read_value()?
        .as_u64()
        .ok_or_else(|| Error::frame_decode(format!("SML message at offset {start} lacks a CRC")))?;
    let computed = SML_CRC.checksum(reader.slice(start, crc_at)).swap_bytes();

    if fields >= MESSAGE_FIELDS {
        if reader.peek() == Some(END_OF_MESSAGE) {
            reader.skip(1);
        } else {
            return Err(Error::frame_decode(format!(
                "SML message at offset {start} is not terminated"
            )));
        }
        for _ in MESSAGE_FIELDS..fields {
            reader.read_value()?;
        }
    }

    let (tag, content) = match body.as_list() {
        Some([tag, content]) => (
            tag.as_u64()
                .and_then(|tag| u32::try_from(tag).ok())
                .ok_or_else(|| Error::frame_decode("SML message body without tag"))?,
            content,
        ),
        _ => return Err(Error::frame_decode("SML message body is not a choice")),
    };

    let kind = SmlListKind::from_tag(tag);
    let entries = match kind {
        SmlListKind::CurrentValues => list_entries(content)?,
        SmlListKind::Profile => period_entries(content)?,
        SmlListKind::Other(_) => Vec::new(),
    };

    Ok(SmlList {
        kind,
        valid: u64::from(computed) == stored_crc,
        entries,
    })
}

/// Entries of a `GetListResponse` value list.
fn list_entries(content: &SmlValue) -> Result<Vec<SmlEntry>> {
    let items = nested_list(content, GET_LIST_VAL_LIST, "GetListResponse")?;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item.as_list() {
            Some([name, _status, _val_time, unit, scaler, value, _signature, ..]) => {
                if let Some(entry) = build_entry(name, unit, scaler, value)? {
                    entries.push(entry);
                }
            }
            _ => {
                return Err(Error::frame_decode(format!(
                    "List entry must have {LIST_ENTRY_FIELDS} fields"
                )));
            }
        }
    }
    Ok(entries)
}

/// Entries of a `GetProfileListResponse` period list.
fn period_entries(content: &SmlValue) -> Result<Vec<SmlEntry>> {
    let items = nested_list(content, PROFILE_PERIOD_LIST, "GetProfileListResponse")?;
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item.as_list() {
            Some([name, unit, scaler, value, _signature, ..]) => {
                if let Some(entry) = build_entry(name, unit, scaler, value)? {
                    entries.push(entry);
                }
            }
            _ => {
                return Err(Error::frame_decode(format!(
                    "Period entry must have {PERIOD_ENTRY_FIELDS} fields"
                )));
            }
        }
    }
    Ok(entries)
}

fn nested_list<'a>(content: &'a SmlValue, index: usize, what: &str) -> Result<&'a [SmlValue]> {
    let fields = content
        .as_list()
        .ok_or_else(|| Error::frame_decode(format!("{what} body is not a list")))?;
    match fields.get(index) {
        Some(SmlValue::List(items)) => Ok(items),
        Some(SmlValue::Absent) => Ok(&[]),
        _ => Err(Error::frame_decode(format!("{what} has no value list"))),
    }
}

fn build_entry(
    name: &SmlValue,
    unit: &SmlValue,
    scaler: &SmlValue,
    value: &SmlValue,
) -> Result<Option<SmlEntry>> {
    let name = name
        .as_bytes()
        .ok_or_else(|| Error::frame_decode("List entry without object name"))?;
    let id = ObisCode::from_bytes(name).map_or_else(|| hex(name), |code| code.to_string());

    let value = match value {
        SmlValue::Integer(v) => ReadingValue::Number(*v as f64),
        SmlValue::Unsigned(v) => ReadingValue::Number(*v as f64),
        SmlValue::Boolean(v) => ReadingValue::Text(v.to_string()),
        SmlValue::OctetString(bytes) => ReadingValue::Text(text_or_hex(bytes)),
        SmlValue::Absent | SmlValue::List(_) => {
            tracing::trace!(id = %id, "Skipping list entry without scalar value");
            return Ok(None);
        }
    };

    let unit = match unit {
        SmlValue::Absent => "",
        other => other.as_u64().and_then(|c| u8::try_from(c).ok()).map_or("", unit_symbol),
    };

    let scaler = match scaler {
        SmlValue::Absent => None,
        other => Some(
            other
                .as_i64()
                .and_then(|s| i8::try_from(s).ok())
                .ok_or_else(|| Error::frame_decode(format!("Invalid scaler for {id}")))?,
        ),
    };

    Ok(Some(SmlEntry {
        id,
        value,
        unit: unit.to_string(),
        scaler,
    }))
}

fn text_or_hex(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        hex(bytes)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
