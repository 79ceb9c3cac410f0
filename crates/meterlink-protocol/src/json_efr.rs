//! JSON billing documents as emitted by EFR smart meter gateways.
//!
//! One document per read, shaped like:
//!
//! ```json
//! {"billingData:": {"total": [{"obis": "1-0:1.8.0", "value": 42, "unit": "kWh"}]}}
//! ```
//!
//! The trailing colon in `billingData:` is part of the key.

use meterlink_core::constants::EFR_BILLING_KEY;
use meterlink_core::{DebugLevel, Error, Measurements, ObisCode, ReadingValue, Result};
use serde_json::Value;

use crate::protocol::{DecodedFrame, ProtocolStrategy, deliver};
use crate::sink::MeasurementSink;

/// Receive-only strategy for EFR JSON billing documents.
pub struct JsonEfrProtocol {
    sink: Box<dyn MeasurementSink>,
    debug: DebugLevel,
}

impl JsonEfrProtocol {
    pub fn new(sink: impl MeasurementSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            debug: DebugLevel::Off,
        }
    }

    #[must_use]
    pub fn debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    fn collect(&self, document: &Value) -> Measurements {
        let mut measurements = Measurements::new();
        let Some(billing) = document.get(EFR_BILLING_KEY).and_then(Value::as_object) else {
            return measurements;
        };

        for (group, entries) in billing {
            let Some(entries) = entries.as_array() else {
                tracing::trace!(group = %group, "Skipping non-list billing group");
                continue;
            };
            for entry in entries {
                let Some(obis) = entry.get("obis").and_then(Value::as_str) else {
                    tracing::warn!(group = %group, "Billing entry without obis code skipped");
                    continue;
                };
                let id = obis
                    .parse::<ObisCode>()
                    .map_or_else(|_| obis.to_string(), |code| code.to_string());
                let unit = entry.get("unit").and_then(Value::as_str).unwrap_or("");
                measurements.record(id, json_value(entry.get("value")), unit);
            }
        }

        measurements
    }
}

fn json_value(value: Option<&Value>) -> ReadingValue {
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or_else(|| ReadingValue::Text(n.to_string()), ReadingValue::Number),
        Some(Value::String(s)) => ReadingValue::Text(s.clone()),
        Some(other) => ReadingValue::Text(other.to_string()),
        None => ReadingValue::Text(String::new()),
    }
}

impl ProtocolStrategy for JsonEfrProtocol {
    fn name(&self) -> &'static str {
        "json-efr"
    }

    fn init_state(&mut self) {}

    fn is_session_complete(&self) -> bool {
        true
    }

    fn pending_outbound_count(&self) -> usize {
        0
    }

    fn detect_complete_frame(&self, buffer: &[u8]) -> bool {
        serde_json::from_slice::<Value>(buffer).is_ok()
    }

    fn decode_frame(&mut self, buffer: &[u8]) -> Result<DecodedFrame> {
        let document: Value = serde_json::from_slice(buffer)
            .map_err(|e| Error::frame_decode(format!("JSON parse error: {e}")))?;

        let measurements = self.collect(&document);
        if self.debug.is_verbose() {
            tracing::debug!(bytes = buffer.len(), records = measurements.len(), "Decoded billing document");
        }
        deliver(self.sink.as_mut(), &measurements, self.debug.is_verbose());

        Ok(DecodedFrame {
            measurements,
            leftover: Vec::new(),
        })
    }
}

impl std::fmt::Debug for JsonEfrProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEfrProtocol")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    fn protocol() -> (JsonEfrProtocol, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        let sink_calls = Arc::clone(&calls);
        let protocol = JsonEfrProtocol::new(move |_: &Measurements| {
            *sink_calls.lock().unwrap() += 1;
        });
        (protocol, calls)
    }

    #[rstest]
    #[case(br#"{"billingData:": {}}"#.as_slice(), true)]
    #[case(br#"[1, 2]"#.as_slice(), true)]
    #[case(br#"{"billingData:": {"#.as_slice(), false)]
    #[case(b"".as_slice(), false)]
    #[case(b"\x1b\x1b\x1b\x1b".as_slice(), false)]
    fn test_detect(#[case] input: &[u8], #[case] expected: bool) {
        let (protocol, _) = protocol();
        assert_eq!(protocol.detect_complete_frame(input), expected);
    }

    #[test]
    fn test_empty_billing_data() {
        let (mut protocol, calls) = protocol();
        let decoded = protocol.decode_frame(br#"{"billingData:": {}}"#).unwrap();
        assert!(decoded.measurements.is_empty());
        assert!(decoded.leftover.is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_single_entry() {
        let (mut protocol, calls) = protocol();
        let input = br#"{"billingData:": {"values": [{"obis": "1-0:1.8.0", "value": 42, "unit": "kWh"}]}}"#;

        let decoded = protocol.decode_frame(input).unwrap();
        assert_eq!(decoded.measurements.len(), 1);
        let record = decoded.measurements.get("1-0:1.8.0").unwrap();
        assert_eq!(record.readings().len(), 1);
        assert_eq!(record.readings()[0].value, ReadingValue::Number(42.0));
        assert_eq!(record.readings()[0].unit, "kWh");
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_entries_merge_across_groups() {
        let (mut protocol, _) = protocol();
        let input = br#"{"billingData:": {
            "tariff1": [{"obis": "1-0:1.8.1", "value": 1.5, "unit": "kWh"}],
            "tariff1b": [{"obis": "1-0:1.8.1", "value": "n/a"}],
            "note": "not a list",
            "total": [{"value": 3}]
        }}"#;

        let decoded = protocol.decode_frame(input).unwrap();
        let record = decoded.measurements.get("1-0:1.8.1").unwrap();
        assert_eq!(record.readings().len(), 2);
        assert_eq!(record.readings()[1].value, ReadingValue::Text("n/a".to_string()));
        assert_eq!(record.readings()[1].unit, "");
        assert_eq!(decoded.measurements.len(), 1);
    }

    #[test]
    fn test_obis_with_storage_field_normalized() {
        let (mut protocol, _) = protocol();
        let input = br#"{"billingData:": {"g": [{"obis": "1-0:1.8.0*255", "value": 1}]}}"#;
        let decoded = protocol.decode_frame(input).unwrap();
        assert!(decoded.measurements.get("1-0:1.8.0").is_some());
    }

    #[test]
    fn test_parse_error_is_frame_decode() {
        let (mut protocol, calls) = protocol();
        match protocol.decode_frame(b"{not json") {
            Err(Error::FrameDecode(message)) => assert!(message.contains("JSON parse error")),
            other => panic!("expected FrameDecode, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
