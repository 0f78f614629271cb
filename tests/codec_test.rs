use hub_analytics::core::{
    datapoint::Payload, decode_value, encode_value, CodecFault, Datapoint, FieldValue,
    SeriesDatapoint, Value,
};
use prost::Message;
use std::collections::HashMap;

#[test]
fn test_value_round_trips() {
    let values = [
        FieldValue::UInt(u64::MAX),
        FieldValue::Int(i64::MIN),
        FieldValue::Str("héllo".into()),
        FieldValue::Null,
    ];

    for value in values {
        assert_eq!(decode_value(&encode_value(&value)), Ok(value));
    }
}

#[test]
fn test_value_survives_the_wire() {
    let bytes = encode_value(&FieldValue::Int(-42)).encode_to_vec();
    let decoded = Value::decode(bytes.as_slice()).unwrap();
    assert_eq!(decode_value(&decoded), Ok(FieldValue::Int(-42)));
}

#[test]
fn test_unset_variant_is_a_fault_not_a_default() {
    assert_eq!(decode_value(&Value { kind: None }), Err(CodecFault::UnknownVariant));
}

#[test]
fn test_variant_from_newer_producer_is_a_fault() {
    // Field 9 is not part of the union; prost skips it and leaves `kind` unset.
    let decoded = Value::decode(&[0x48, 0x01][..]).unwrap();
    assert_eq!(decode_value(&decoded), Err(CodecFault::UnknownVariant));
}

#[test]
fn test_datapoint_decodes_from_stream_bytes() {
    let mut fields = HashMap::new();
    fields.insert("count".to_string(), encode_value(&FieldValue::UInt(7)));

    let datapoint = Datapoint {
        ts: Some(prost_types::Timestamp { seconds: 5, nanos: 0 }),
        organization_id: "o1".into(),
        project_id: "p1".into(),
        payload: Some(Payload::Series(SeriesDatapoint {
            series: "visits".into(),
            tags: HashMap::new(),
            fields,
        })),
    };

    let decoded = Datapoint::decode(datapoint.encode_to_vec().as_slice()).unwrap();
    assert_eq!(decoded, datapoint);
}
