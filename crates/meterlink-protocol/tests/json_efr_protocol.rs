//! EFR JSON billing documents through the strategy interface.

mod common;

use common::RecordingSink;
use meterlink_core::{Error, ReadingValue};
use meterlink_protocol::{JsonEfrProtocol, ProtocolStrategy};

const GATEWAY_DOCUMENT: &str = r#"{
    "billingData:": {
        "energy": [
            {"obis": "1-0:1.8.0", "value": 42, "unit": "kWh"},
            {"obis": "1-0:2.8.0", "value": 0.5, "unit": "kWh"}
        ],
        "power": [
            {"obis": "1-0:16.7.0", "value": -120, "unit": "W"}
        ],
        "meta": [
            {"obis": "0-0:96.1.0", "value": "1EFR0012345678"}
        ]
    },
    "gatewayTime": "2024-01-31T12:00:00Z"
}"#;

#[test]
fn test_empty_billing_data_delivers_nothing() {
    let sink = RecordingSink::new();
    let mut protocol = JsonEfrProtocol::new(sink.clone());

    let input = br#"{"billingData:": {}}"#;
    assert!(protocol.detect_complete_frame(input));
    let decoded = protocol.decode_frame(input).unwrap();

    assert!(decoded.measurements.is_empty());
    assert!(decoded.leftover.is_empty());
    assert_eq!(sink.calls(), 0);
}

#[test]
fn test_single_entry_becomes_one_record() {
    let sink = RecordingSink::new();
    let mut protocol = JsonEfrProtocol::new(sink.clone());

    let input = br#"{"billingData:": {"x": [{"obis": "1-0:1.8.0", "value": 42, "unit": "kWh"}]}}"#;
    let decoded = protocol.decode_frame(input).unwrap();

    assert_eq!(decoded.measurements.ids().collect::<Vec<_>>(), vec!["1-0:1.8.0"]);
    let record = decoded.measurements.get("1-0:1.8.0").unwrap();
    assert_eq!(record.id(), "1-0:1.8.0");
    assert_eq!(record.readings().len(), 1);
    assert_eq!(record.readings()[0].value, ReadingValue::Number(42.0));
    assert_eq!(record.readings()[0].unit, "kWh");
    assert_eq!(sink.calls(), 1);
}

#[test]
fn test_gateway_document() {
    let sink = RecordingSink::new();
    let mut protocol = JsonEfrProtocol::new(sink.clone());

    let decoded = protocol.decode_frame(GATEWAY_DOCUMENT.as_bytes()).unwrap();

    assert_eq!(decoded.measurements.len(), 4);
    assert_eq!(
        decoded.measurements.get("1-0:16.7.0").unwrap().first().unwrap().value,
        ReadingValue::Number(-120.0)
    );
    let serial = decoded.measurements.get("0-0:96.1.0").unwrap().first().unwrap();
    assert_eq!(serial.value, ReadingValue::Text("1EFR0012345678".to_string()));
    assert_eq!(serial.unit, "");
    assert_eq!(sink.sets().len(), 1);
}

#[test]
fn test_partial_document_not_detected() {
    let protocol = JsonEfrProtocol::new(RecordingSink::new());
    let bytes = GATEWAY_DOCUMENT.as_bytes();

    assert!(!protocol.detect_complete_frame(&bytes[..bytes.len() / 2]));
    assert!(!protocol.detect_complete_frame(&bytes[..bytes.len() - 1]));
    assert!(protocol.detect_complete_frame(bytes));
}

#[test]
fn test_missing_billing_key_is_empty() {
    let sink = RecordingSink::new();
    let mut protocol = JsonEfrProtocol::new(sink.clone());

    // Without the trailing colon the key does not match
    let decoded = protocol
        .decode_frame(br#"{"billingData": {"x": [{"obis": "1-0:1.8.0", "value": 1}]}}"#)
        .unwrap();
    assert!(decoded.measurements.is_empty());
    assert_eq!(sink.calls(), 0);
}

#[test]
fn test_invalid_json_carries_parser_message() {
    let mut protocol = JsonEfrProtocol::new(RecordingSink::new());

    let err = protocol.decode_frame(b"{\"billingData:\": [").unwrap_err();
    match err {
        Error::FrameDecode(message) => assert!(message.contains("EOF"), "message: {message}"),
        other => panic!("expected FrameDecode, got {other:?}"),
    }
}
