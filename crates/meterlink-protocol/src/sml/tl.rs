//! SML type-length encoding.
//!
//! Every SML value starts with a type-length (TL) field:
//!
//! ```text
//!  bit   7    6 5 4    3 2 1 0
//!      more   type     length nibble
//! ```
//!
//! - `more` set: another TL byte follows, contributing four more length bits.
//! - type `000` octet string, `100` boolean, `101` integer, `110` unsigned,
//!   `111` list.
//! - For scalar types the length counts the TL bytes plus the content; for
//!   lists it is the number of elements.
//!
//! `0x01` (an octet string without content) marks an absent optional
//! value, `0x00` terminates a message.

use meterlink_core::{Error, Result};

/// TL byte terminating an SML message.
pub(crate) const END_OF_MESSAGE: u8 = 0x00;

/// TL byte of an absent optional value.
const ABSENT: u8 = 0x01;

/// Nesting limit for lists; real files stay below 8.
const MAX_DEPTH: usize = 16;

const TYPE_OCTET_STRING: u8 = 0b000;
const TYPE_BOOLEAN: u8 = 0b100;
const TYPE_INTEGER: u8 = 0b101;
const TYPE_UNSIGNED: u8 = 0b110;
const TYPE_LIST: u8 = 0b111;

/// A decoded SML value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmlValue {
    Absent,
    OctetString(Vec<u8>),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    List(Vec<SmlValue>),
}

impl SmlValue {
    #[must_use]
    pub fn as_list(&self) -> Option<&[SmlValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Numeric value of integer or unsigned nodes.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(value) => Some(*value),
            Self::Integer(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Unsigned(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Append the wire encoding of this value to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Absent => out.push(ABSENT),
            Self::OctetString(bytes) => {
                write_scalar_tl(out, TYPE_OCTET_STRING, bytes.len());
                out.extend_from_slice(bytes);
            }
            Self::Boolean(value) => {
                write_scalar_tl(out, TYPE_BOOLEAN, 1);
                out.push(u8::from(*value));
            }
            Self::Integer(value) => {
                let width = integer_width(*value);
                write_scalar_tl(out, TYPE_INTEGER, width);
                out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
            }
            Self::Unsigned(value) => {
                let width = unsigned_width(*value);
                write_scalar_tl(out, TYPE_UNSIGNED, width);
                out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
            }
            Self::List(items) => {
                write_tl(out, TYPE_LIST, items.len());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

impl From<i64> for SmlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for SmlValue {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<bool> for SmlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&[u8]> for SmlValue {
    fn from(value: &[u8]) -> Self {
        Self::OctetString(value.to_vec())
    }
}

impl From<&str> for SmlValue {
    fn from(value: &str) -> Self {
        Self::OctetString(value.as_bytes().to_vec())
    }
}

/// Smallest of the SML integer widths (1, 2, 4, 8 bytes) holding `value`.
fn integer_width(value: i64) -> usize {
    if i8::try_from(value).is_ok() {
        1
    } else if i16::try_from(value).is_ok() {
        2
    } else if i32::try_from(value).is_ok() {
        4
    } else {
        8
    }
}

fn unsigned_width(value: u64) -> usize {
    if u8::try_from(value).is_ok() {
        1
    } else if u16::try_from(value).is_ok() {
        2
    } else if u32::try_from(value).is_ok() {
        4
    } else {
        8
    }
}

/// Scalar TL: the encoded length includes the TL bytes themselves.
fn write_scalar_tl(out: &mut Vec<u8>, ty: u8, content_len: usize) {
    let mut tl_len = 1;
    while content_len + tl_len >= 1 << (4 * tl_len) {
        tl_len += 1;
    }
    write_tl_bytes(out, ty, content_len + tl_len, tl_len);
}

fn write_tl(out: &mut Vec<u8>, ty: u8, len: usize) {
    let mut tl_len = 1;
    while len >= 1 << (4 * tl_len) {
        tl_len += 1;
    }
    write_tl_bytes(out, ty, len, tl_len);
}

fn write_tl_bytes(out: &mut Vec<u8>, ty: u8, len: usize, tl_len: usize) {
    for i in 0..tl_len {
        let shift = 4 * (tl_len - 1 - i);
        let nibble = ((len >> shift) & 0x0f) as u8;
        let more = if i + 1 < tl_len { 0x80 } else { 0x00 };
        let ty_bits = if i == 0 { ty << 4 } else { 0x00 };
        out.push(more | ty_bits | nibble);
    }
}

/// Cursor over an unescaped SML byte sequence.
#[derive(Debug)]
pub(crate) struct TlReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn skip(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.buf.len());
    }

    /// Bytes between two cursor positions.
    pub(crate) fn slice(&self, from: usize, to: usize) -> &'a [u8] {
        &self.buf[from..to]
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = self
            .peek()
            .ok_or_else(|| Error::frame_decode(format!("Unexpected end of data at offset {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a TL field; returns `(type, length, tl_bytes)`.
    pub(crate) fn read_tl(&mut self) -> Result<(u8, usize, usize)> {
        let offset = self.pos;
        let first = self.next_byte()?;
        let ty = (first >> 4) & 0x07;
        let mut len = usize::from(first & 0x0f);
        let mut tl_len = 1;
        let mut more = first & 0x80 != 0;

        while more {
            if tl_len == 4 {
                return Err(Error::frame_decode(format!("TL field too long at offset {offset}")));
            }
            let byte = self.next_byte()?;
            more = byte & 0x80 != 0;
            len = (len << 4) | usize::from(byte & 0x0f);
            tl_len += 1;
        }

        Ok((ty, len, tl_len))
    }

    /// Read the header of a list and return its element count.
    pub(crate) fn read_list_header(&mut self) -> Result<usize> {
        let offset = self.pos;
        let (ty, len, _) = self.read_tl()?;
        if ty != TYPE_LIST {
            return Err(Error::frame_decode(format!(
                "Expected list at offset {offset}, found type {ty:#05b}"
            )));
        }
        Ok(len)
    }

    /// Read one complete value, including nested lists.
    pub(crate) fn read_value(&mut self) -> Result<SmlValue> {
        self.read_value_at(0)
    }

    fn read_value_at(&mut self, depth: usize) -> Result<SmlValue> {
        if depth > MAX_DEPTH {
            return Err(Error::frame_decode("List nesting too deep"));
        }

        let offset = self.pos;
        match self.peek() {
            Some(END_OF_MESSAGE) => {
                return Err(Error::frame_decode(format!(
                    "Unexpected end-of-message at offset {offset}"
                )));
            }
            Some(ABSENT) => {
                self.pos += 1;
                return Ok(SmlValue::Absent);
            }
            _ => {}
        }

        let (ty, len, tl_len) = self.read_tl()?;
        if ty == TYPE_LIST {
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                items.push(self.read_value_at(depth + 1)?);
            }
            return Ok(SmlValue::List(items));
        }

        let content_len = len.checked_sub(tl_len).ok_or_else(|| {
            Error::frame_decode(format!("Length {len} shorter than TL field at offset {offset}"))
        })?;
        let end = self.pos + content_len;
        if end > self.buf.len() {
            return Err(Error::frame_decode(format!(
                "Value at offset {offset} needs {content_len} bytes, {} available",
                self.buf.len() - self.pos
            )));
        }
        let content = &self.buf[self.pos..end];
        self.pos = end;

        match ty {
            TYPE_OCTET_STRING => Ok(SmlValue::OctetString(content.to_vec())),
            TYPE_BOOLEAN => match content {
                [value] => Ok(SmlValue::Boolean(*value != 0)),
                _ => Err(Error::frame_decode(format!("Invalid boolean at offset {offset}"))),
            },
            TYPE_INTEGER => {
                check_width(content, offset)?;
                let sign = if content[0] & 0x80 != 0 { -1i64 } else { 0 };
                Ok(SmlValue::Integer(
                    content.iter().fold(sign, |acc, &b| (acc << 8) | i64::from(b)),
                ))
            }
            TYPE_UNSIGNED => {
                check_width(content, offset)?;
                Ok(SmlValue::Unsigned(
                    content.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                ))
            }
            other => Err(Error::frame_decode(format!(
                "Unknown SML type {other:#05b} at offset {offset}"
            ))),
        }
    }
}

fn check_width(content: &[u8], offset: usize) -> Result<()> {
    if content.is_empty() || content.len() > 8 {
        return Err(Error::frame_decode(format!(
            "Invalid number width {} at offset {offset}",
            content.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encode(value: &SmlValue) -> Vec<u8> {
        let mut out = Vec::new();
        value.encode(&mut out);
        out
    }

    fn decode(bytes: &[u8]) -> SmlValue {
        TlReader::new(bytes).read_value().unwrap()
    }

    #[rstest]
    #[case(&[0x62, 0x1e], SmlValue::Unsigned(30))]
    #[case(&[0x52, 0xff], SmlValue::Integer(-1))]
    #[case(&[0x53, 0x01, 0x00], SmlValue::Integer(256))]
    #[case(&[0x55, 0xff, 0xff, 0xff, 0x38], SmlValue::Integer(-200))]
    #[case(&[0x65, 0x00, 0x00, 0x07, 0x01], SmlValue::Unsigned(0x0701))]
    #[case(&[0x42, 0x01], SmlValue::Boolean(true))]
    #[case(&[0x01], SmlValue::Absent)]
    #[case(&[0x04, b'E', b'S', b'Y'], SmlValue::OctetString(b"ESY".to_vec()))]
    fn test_decode_known_encodings(#[case] bytes: &[u8], #[case] expected: SmlValue) {
        assert_eq!(decode(bytes), expected);
    }

    #[test]
    fn test_decode_nested_list() {
        let bytes = [0x72, 0x62, 0x01, 0x72, 0x01, 0x42, 0x00];
        assert_eq!(
            decode(&bytes),
            SmlValue::List(vec![
                SmlValue::Unsigned(1),
                SmlValue::List(vec![SmlValue::Absent, SmlValue::Boolean(false)]),
            ])
        );
    }

    #[test]
    fn test_multi_byte_tl() {
        // 20 content bytes need a two byte TL: total length 22 = 0x16
        let value = SmlValue::OctetString(vec![0xaa; 20]);
        let bytes = encode(&value);
        assert_eq!(&bytes[..2], &[0x81, 0x06]);
        assert_eq!(bytes.len(), 22);
        assert_eq!(decode(&bytes), value);
    }

    #[test]
    fn test_minimal_integer_widths() {
        assert_eq!(encode(&SmlValue::Integer(-1)), vec![0x52, 0xff]);
        assert_eq!(encode(&SmlValue::Integer(300)), vec![0x53, 0x01, 0x2c]);
        assert_eq!(encode(&SmlValue::Unsigned(70_000)).len(), 5);
        assert_eq!(encode(&SmlValue::Unsigned(u64::MAX)).len(), 9);
    }

    #[test]
    fn test_truncated_value_is_decode_error() {
        let result = TlReader::new(&[0x65, 0x00, 0x01]).read_value();
        assert!(matches!(result, Err(Error::FrameDecode(_))));
    }

    #[test]
    fn test_end_of_message_is_not_a_value() {
        let result = TlReader::new(&[0x00]).read_value();
        assert!(matches!(result, Err(Error::FrameDecode(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        // type 001 is not defined
        let result = TlReader::new(&[0x12, 0x00]).read_value();
        assert!(matches!(result, Err(Error::FrameDecode(_))));
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let bytes = vec![0x71; MAX_DEPTH + 2];
        let result = TlReader::new(&bytes).read_value();
        assert!(matches!(result, Err(Error::FrameDecode(_))));
    }
}
