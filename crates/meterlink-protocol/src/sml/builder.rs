use meterlink_core::ObisCode;
use meterlink_core::constants::{
    SML_END_MARKER, SML_ESCAPE, SML_GET_LIST_RESPONSE, SML_GET_PROFILE_LIST_RESPONSE,
    SML_START_ESCAPE,
};

use super::codec::SML_CRC;
use super::framing::escape;
use super::tl::{END_OF_MESSAGE, SmlValue};

const OPEN_RESPONSE: u32 = 0x0101;
const CLOSE_RESPONSE: u32 = 0x0201;

/// Profile registration period written into profile responses, seconds.
const PROFILE_PERIOD_SECS: u64 = 900;

/// One value entry for [`SmlFileBuilder`] responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    name: ObisCode,
    value: SmlValue,
    unit: Option<u8>,
    scaler: Option<i8>,
}

impl ListEntry {
    pub fn new(name: ObisCode, value: impl Into<SmlValue>) -> Self {
        Self {
            name,
            value: value.into(),
            unit: None,
            scaler: None,
        }
    }

    /// DLMS unit code.
    #[must_use]
    pub fn unit(mut self, code: u8) -> Self {
        self.unit = Some(code);
        self
    }

    #[must_use]
    pub fn scaler(mut self, scaler: i8) -> Self {
        self.scaler = Some(scaler);
        self
    }

    fn name_value(&self) -> SmlValue {
        SmlValue::OctetString(self.name.to_bytes().to_vec())
    }

    fn unit_value(&self) -> SmlValue {
        self.unit.map_or(SmlValue::Absent, |code| SmlValue::Unsigned(u64::from(code)))
    }

    fn scaler_value(&self) -> SmlValue {
        self.scaler.map_or(SmlValue::Absent, |s| SmlValue::Integer(i64::from(s)))
    }

    fn to_list_entry(&self) -> SmlValue {
        SmlValue::List(vec![
            self.name_value(),
            SmlValue::Absent,
            SmlValue::Absent,
            self.unit_value(),
            self.scaler_value(),
            self.value.clone(),
            SmlValue::Absent,
        ])
    }

    fn to_period_entry(&self) -> SmlValue {
        SmlValue::List(vec![
            self.name_value(),
            self.unit_value(),
            self.scaler_value(),
            self.value.clone(),
            SmlValue::Absent,
        ])
    }
}

#[derive(Debug, Clone)]
struct PendingMessage {
    tag: u32,
    content: SmlValue,
    corrupt_crc: bool,
}

/// Builder for complete, escaped SML files
///
/// Produces the byte stream a meter would emit: start escape, messages with
/// valid per-message CRCs, padding, end escape and file CRC. Mostly useful
/// for tests and for replaying synthetic meters.
///
/// # Example
/// ```
/// use meterlink_core::ObisCode;
/// use meterlink_protocol::sml::{ListEntry, SmlFileBuilder};
///
/// let frame = SmlFileBuilder::new()
///     .open_response()
///     .get_list_response(vec![
///         ListEntry::new(ObisCode::new(1, 0, 1, 8, 0, 255), 12_345i64).unit(30).scaler(-1),
///     ])
///     .close_response()
///     .build();
/// assert_eq!(&frame[..4], &[0x1b; 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SmlFileBuilder {
    server_id: Vec<u8>,
    messages: Vec<PendingMessage>,
}

impl Default for SmlFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SmlFileBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            server_id: vec![0x0a, 0x01, 0x45, 0x4d, 0x48, 0x00, 0x00, 0x4f, 0x2a, 0x77],
            messages: Vec::new(),
        }
    }

    /// Server id written into every response.
    #[must_use]
    pub fn server_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.server_id = id.into();
        self
    }

    #[must_use]
    pub fn open_response(self) -> Self {
        let content = SmlValue::List(vec![
            SmlValue::Absent,
            SmlValue::Absent,
            SmlValue::from("meterlink"),
            SmlValue::OctetString(self.server_id.clone()),
            SmlValue::Absent,
            SmlValue::Absent,
        ]);
        self.push(OPEN_RESPONSE, content)
    }

    /// Append a `GetListResponse` carrying `entries` as current values.
    #[must_use]
    pub fn get_list_response(self, entries: Vec<ListEntry>) -> Self {
        let values = entries.iter().map(ListEntry::to_list_entry).collect();
        let content = SmlValue::List(vec![
            SmlValue::Absent,
            SmlValue::OctetString(self.server_id.clone()),
            SmlValue::Absent,
            SmlValue::Absent,
            SmlValue::List(values),
            SmlValue::Absent,
            SmlValue::Absent,
        ]);
        self.push(SML_GET_LIST_RESPONSE, content)
    }

    /// Append a `GetProfileListResponse` with one period of `entries`.
    #[must_use]
    pub fn get_profile_list_response(self, entries: Vec<ListEntry>) -> Self {
        let period = entries.iter().map(ListEntry::to_period_entry).collect();
        let content = SmlValue::List(vec![
            SmlValue::OctetString(self.server_id.clone()),
            SmlValue::Absent,
            SmlValue::Unsigned(PROFILE_PERIOD_SECS),
            SmlValue::Absent,
            SmlValue::Absent,
            SmlValue::Unsigned(0),
            SmlValue::List(period),
            SmlValue::Absent,
            SmlValue::Absent,
        ]);
        self.push(SML_GET_PROFILE_LIST_RESPONSE, content)
    }

    /// Append a message body this library does not interpret.
    #[must_use]
    pub fn message(self, tag: u32, content: SmlValue) -> Self {
        self.push(tag, content)
    }

    #[must_use]
    pub fn close_response(self) -> Self {
        self.push(CLOSE_RESPONSE, SmlValue::List(vec![SmlValue::Absent]))
    }

    /// Corrupt the CRC of the most recently added message.
    #[must_use]
    pub fn with_invalid_crc(mut self) -> Self {
        if let Some(last) = self.messages.last_mut() {
            last.corrupt_crc = true;
        }
        self
    }

    fn push(mut self, tag: u32, content: SmlValue) -> Self {
        self.messages.push(PendingMessage {
            tag,
            content,
            corrupt_crc: false,
        });
        self
    }

    /// Serialize all messages into one escaped SML file.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut payload = Vec::new();
        for (index, message) in self.messages.iter().enumerate() {
            encode_message(&mut payload, index, message);
        }

        let padding = (4 - payload.len() % 4) % 4;
        payload.resize(payload.len() + padding, 0x00);

        let mut frame = SML_START_ESCAPE.to_vec();
        frame.extend_from_slice(&escape(&payload));
        frame.extend_from_slice(&SML_ESCAPE);
        frame.push(SML_END_MARKER);
        frame.push(padding as u8);
        let crc = SML_CRC.checksum(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }
}

fn encode_message(out: &mut Vec<u8>, index: usize, message: &PendingMessage) {
    let start = out.len();
    let transaction_id = (index as u32 + 1).to_be_bytes();

    // Message list header: six elements
    out.push(0x76);
    SmlValue::OctetString(transaction_id.to_vec()).encode(out);
    SmlValue::Unsigned(0).encode(out);
    SmlValue::Unsigned(0).encode(out);
    SmlValue::List(vec![
        SmlValue::Unsigned(u64::from(message.tag)),
        message.content.clone(),
    ])
    .encode(out);

    let mut crc = SML_CRC.checksum(&out[start..]).swap_bytes();
    if message.corrupt_crc {
        crc ^= 0xffff;
    }
    // CRC is always an Unsigned16
    out.push(0x63);
    out.extend_from_slice(&crc.to_be_bytes());
    out.push(END_OF_MESSAGE);
}
