//! Value codec and InfluxDB line protocol encoding

use crate::core::{value::Kind, FieldValue, NullValue, Point, Value};
use std::fmt::Write;
use thiserror::Error;

/// Raised when a [`Value`] carries a variant this codec does not know.
///
/// The protobuf decoder skips unknown oneof members, so an unset `kind` means
/// the producer's schema has drifted ahead of this build. It is a programming
/// fault, not bad input, and callers must not coerce it into a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecFault {
    #[error("value union carries a variant unknown to this codec")]
    UnknownVariant,
}

/// Field written for a point whose field set is empty or entirely null.
///
/// Line protocol requires at least one field per line.
pub const PRESENCE_FIELD: &str = "_present";

/// Errors produced while rendering a point as line protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("timestamp is outside the nanosecond range")]
    TimestampOutOfRange,
    #[error("series name is empty")]
    EmptySeries,
}

/// Decode one tagged value into the scalar stored in a field set.
pub fn decode_value(value: &Value) -> Result<FieldValue, CodecFault> {
    match &value.kind {
        Some(Kind::Uint(v)) => Ok(FieldValue::UInt(*v)),
        Some(Kind::Int(v)) => Ok(FieldValue::Int(*v)),
        Some(Kind::Str(v)) => Ok(FieldValue::Str(v.clone())),
        Some(Kind::Null(_)) => Ok(FieldValue::Null),
        None => Err(CodecFault::UnknownVariant),
    }
}

/// Encode a field scalar back into the wire union.
pub fn encode_value(value: &FieldValue) -> Value {
    let kind = match value {
        FieldValue::UInt(v) => Kind::Uint(*v),
        FieldValue::Int(v) => Kind::Int(*v),
        FieldValue::Str(v) => Kind::Str(v.clone()),
        FieldValue::Null => Kind::Null(NullValue::NullValue as i32),
    };
    Value { kind: Some(kind) }
}

/// Render a point as a single line of InfluxDB line protocol.
///
/// Tags with empty values are left out, as are null fields, since neither can
/// be expressed on the wire. A point left without fields is written with
/// `_present=true` ([`PRESENCE_FIELD`]). The timestamp is written in nanoseconds.
pub fn to_line_protocol(point: &Point) -> Result<String, EncodeError> {
    if point.series.is_empty() {
        return Err(EncodeError::EmptySeries);
    }
    let timestamp = point.time.timestamp_nanos_opt().ok_or(EncodeError::TimestampOutOfRange)?;

    let mut line = String::with_capacity(64);
    escape_into(&mut line, &point.series, &[',', ' ']);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        escape_into(&mut line, value, &[',', '=', ' ']);
    }

    let mut separator = ' ';
    for (key, value) in &point.fields {
        if key.is_empty() {
            continue;
        }
        let rendered = match value {
            FieldValue::UInt(v) => format!("{}u", v),
            FieldValue::Int(v) => format!("{}i", v),
            FieldValue::Str(v) => {
                let mut quoted = String::with_capacity(v.len() + 2);
                quoted.push('"');
                escape_into(&mut quoted, v, &['"']);
                quoted.push('"');
                quoted
            }
            FieldValue::Null => continue,
        };
        line.push(separator);
        separator = ',';
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        line.push_str(&rendered);
    }

    if separator == ' ' {
        line.push(' ');
        line.push_str(PRESENCE_FIELD);
        line.push_str("=true");
    }

    let _ = write!(line, " {}", timestamp);
    Ok(line)
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(nanos: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_nanos(nanos)
    }

    #[test]
    fn test_line_protocol_basic() {
        let point = Point::new("mints", at(1_700_000_000_000_000_000))
            .tag("organization_id", "o1")
            .tag("collection", "c1")
            .field("user", "u1");

        assert_eq!(
            to_line_protocol(&point).unwrap(),
            "mints,collection=c1,organization_id=o1 user=\"u1\" 1700000000000000000"
        );
    }

    #[test]
    fn test_line_protocol_numeric_suffixes() {
        let point = Point::new("s", at(5)).field("a", 3u64).field("b", -4i64);
        assert_eq!(to_line_protocol(&point).unwrap(), "s a=3u,b=-4i 5");
    }

    #[test]
    fn test_line_protocol_escaping() {
        let point = Point::new("my series,x", at(1))
            .tag("k ey", "v=al,ue")
            .field("f", "say \"hi\" \\ bye");

        assert_eq!(
            to_line_protocol(&point).unwrap(),
            "my\\ series\\,x,k\\ ey=v\\=al\\,ue f=\"say \\\"hi\\\" \\\\ bye\" 1"
        );
    }

    #[test]
    fn test_line_protocol_skips_nulls_and_empty_tags() {
        let point = Point::new("s", at(1))
            .tag("empty", "")
            .field("gone", FieldValue::Null)
            .field("kept", 1u64);
        assert_eq!(to_line_protocol(&point).unwrap(), "s kept=1u 1");
    }

    #[test]
    fn test_fieldless_point_gets_presence_marker() {
        let empty = Point::new("heartbeat", at(1)).tag("organization_id", "o1");
        assert_eq!(to_line_protocol(&empty).unwrap(), "heartbeat,organization_id=o1 _present=true 1");

        let only_null = Point::new("s", at(2)).field("gone", FieldValue::Null);
        assert_eq!(to_line_protocol(&only_null).unwrap(), "s _present=true 2");
    }

    #[test]
    fn test_line_protocol_rejects_timestamp_past_2262() {
        let far = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        let point = Point::new("s", far).field("a", 1u64);
        assert_eq!(to_line_protocol(&point), Err(EncodeError::TimestampOutOfRange));
    }

    #[test]
    fn test_line_protocol_rejects_empty_series() {
        let point = Point::new("", at(1)).field("a", 1u64);
        assert_eq!(to_line_protocol(&point), Err(EncodeError::EmptySeries));
    }

    #[test]
    fn test_null_encodes_as_explicit_variant() {
        let value = encode_value(&FieldValue::Null);
        assert!(matches!(value.kind, Some(Kind::Null(0))));
    }
}
