//! AMF0 encoder and decoder
//!
//! AMF0 is the serialization format for the RTMP command surface
//! (`connect`, `publish`, `onStatus`, ...) and for script data such as
//! `onMetaData`. A message body is a flat sequence of values; this module
//! reads and writes those sequences.
//!
//! Type markers:
//! ```text
//! 0x00 Number    0x01 Boolean   0x02 String       0x03 Object
//! 0x05 Null      0x06 Undefined 0x08 ECMA Array   0x09 Object End
//! 0x0A Strict Array  0x0B Date  0x0C Long String
//! ```

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;

/// Maximum nesting depth for objects/arrays
const MAX_NESTING_DEPTH: usize = 64;

/// Decode every AMF0 value in the buffer.
pub fn decode_sequence(buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Decoder { depth: 0 };
    let mut values = Vec::new();
    while buf.has_remaining() {
        values.push(decoder.decode(buf)?);
    }
    Ok(values)
}

/// Encode a sequence of AMF0 values into a message body.
pub fn encode_sequence(values: &[AmfValue]) -> Bytes {
    let mut buf = BytesMut::new();
    for value in values {
        encode_value(&mut buf, value);
    }
    buf.freeze()
}

struct Decoder {
    depth: usize,
}

impl Decoder {
    fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = match marker {
            MARKER_NUMBER => self.decode_number(buf),
            MARKER_BOOLEAN => self.decode_boolean(buf),
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_OBJECT => self.decode_properties(buf).map(AmfValue::Object),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            _ => Err(AmfError::UnknownMarker(marker)),
        };
        self.depth -= 1;
        result
    }

    fn decode_number(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 8 {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(AmfValue::Number(buf.get_f64()))
    }

    fn decode_boolean(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(AmfValue::Boolean(buf.get_u8() != 0))
    }

    /// Key-value pairs until the empty-key + 0x09 terminator.
    fn decode_properties(
        &mut self,
        buf: &mut Bytes,
    ) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();

        loop {
            let key = read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    // Some encoders omit the trailing end marker
                    break;
                }
                let end_marker = buf.get_u8();
                if end_marker != MARKER_OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                break;
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }
        // Count hint only; the terminator is authoritative
        let _count = buf.get_u32();
        self.decode_properties(buf).map(AmfValue::EcmaArray)
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }
        let count = buf.get_u32() as usize;
        let mut values = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            values.push(self.decode(buf)?);
        }
        Ok(AmfValue::StrictArray(values))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 10 {
            return Err(AmfError::UnexpectedEof);
        }
        let millis = buf.get_f64();
        // Timezone field is reserved, always 0x0000
        let _tz = buf.get_i16();
        Ok(AmfValue::Date(millis))
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

fn encode_value(buf: &mut BytesMut, value: &AmfValue) {
    match value {
        AmfValue::Number(n) => {
            buf.put_u8(MARKER_NUMBER);
            buf.put_f64(*n);
        }
        AmfValue::Boolean(b) => {
            buf.put_u8(MARKER_BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        AmfValue::String(s) => {
            if s.len() > u16::MAX as usize {
                buf.put_u8(MARKER_LONG_STRING);
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            } else {
                buf.put_u8(MARKER_STRING);
                put_utf8(buf, s);
            }
        }
        AmfValue::Object(props) => {
            buf.put_u8(MARKER_OBJECT);
            encode_properties(buf, props);
        }
        AmfValue::Null => buf.put_u8(MARKER_NULL),
        AmfValue::Undefined => buf.put_u8(MARKER_UNDEFINED),
        AmfValue::EcmaArray(props) => {
            buf.put_u8(MARKER_ECMA_ARRAY);
            buf.put_u32(props.len() as u32);
            encode_properties(buf, props);
        }
        AmfValue::StrictArray(values) => {
            buf.put_u8(MARKER_STRICT_ARRAY);
            buf.put_u32(values.len() as u32);
            for v in values {
                encode_value(buf, v);
            }
        }
        AmfValue::Date(millis) => {
            buf.put_u8(MARKER_DATE);
            buf.put_f64(*millis);
            buf.put_i16(0);
        }
    }
}

fn encode_properties(buf: &mut BytesMut, props: &HashMap<String, AmfValue>) {
    for (key, value) in props {
        put_utf8(buf, key);
        encode_value(buf, value);
    }
    // Empty key + object end marker
    buf.put_u16(0);
    buf.put_u8(MARKER_OBJECT_END);
}

fn put_utf8(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: Vec<AmfValue>) -> Vec<AmfValue> {
        let mut encoded = encode_sequence(&values);
        decode_sequence(&mut encoded).expect("decode failed")
    }

    #[test]
    fn test_roundtrip_primitives() {
        let values = vec![
            AmfValue::Number(42.5),
            AmfValue::Boolean(true),
            AmfValue::String("connect".into()),
            AmfValue::Null,
            AmfValue::Undefined,
        ];
        assert_eq!(roundtrip(values.clone()), values);
    }

    #[test]
    fn test_roundtrip_object() {
        let mut props = HashMap::new();
        props.insert("app".to_string(), AmfValue::String("live".into()));
        props.insert("objectEncoding".to_string(), AmfValue::Number(0.0));

        let decoded = roundtrip(vec![AmfValue::Object(props.clone())]);
        assert_eq!(decoded, vec![AmfValue::Object(props)]);
    }

    #[test]
    fn test_roundtrip_ecma_array() {
        let mut props = HashMap::new();
        props.insert("width".to_string(), AmfValue::Number(1920.0));
        props.insert("height".to_string(), AmfValue::Number(1080.0));

        let decoded = roundtrip(vec![AmfValue::EcmaArray(props.clone())]);
        assert_eq!(decoded, vec![AmfValue::EcmaArray(props)]);
    }

    #[test]
    fn test_roundtrip_strict_array_and_date() {
        let values = vec![
            AmfValue::StrictArray(vec![AmfValue::Number(1.0), AmfValue::String("x".into())]),
            AmfValue::Date(1_700_000_000_000.0),
        ];
        assert_eq!(roundtrip(values.clone()), values);
    }

    #[test]
    fn test_connect_command_shape() {
        // ("connect", 1.0, {app: "live"}), the shape every session starts with
        let mut obj = HashMap::new();
        obj.insert("app".to_string(), AmfValue::String("live".into()));

        let decoded = roundtrip(vec![
            AmfValue::String("connect".into()),
            AmfValue::Number(1.0),
            AmfValue::Object(obj),
        ]);

        assert_eq!(decoded[0].as_str(), Some("connect"));
        assert_eq!(decoded[1].as_number(), Some(1.0));
        assert_eq!(decoded[2].get_string("app"), Some("live"));
    }

    #[test]
    fn test_long_string_roundtrip() {
        let long = "x".repeat(70_000);
        let decoded = roundtrip(vec![AmfValue::String(long.clone())]);
        assert_eq!(decoded, vec![AmfValue::String(long)]);
    }

    #[test]
    fn test_truncated_number_fails() {
        let mut buf = Bytes::from_static(&[MARKER_NUMBER, 0x00, 0x01]);
        assert!(matches!(
            decode_sequence(&mut buf),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_truncated_string_fails() {
        // Declares 10 bytes, provides 2
        let mut buf = Bytes::from_static(&[MARKER_STRING, 0x00, 0x0A, b'h', b'i']);
        assert!(matches!(
            decode_sequence(&mut buf),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unknown_marker_fails() {
        let mut buf = Bytes::from_static(&[0x42]);
        assert!(matches!(
            decode_sequence(&mut buf),
            Err(AmfError::UnknownMarker(0x42))
        ));
    }

    #[test]
    fn test_missing_object_end_tolerated_at_eof() {
        // Object with one property, then the buffer just ends after the
        // empty key; some encoders do this
        let mut buf = BytesMut::new();
        buf.put_u8(MARKER_OBJECT);
        put_utf8(&mut buf, "app");
        buf.put_u8(MARKER_STRING);
        put_utf8(&mut buf, "live");
        buf.put_u16(0); // empty key, no end marker, no more bytes

        let mut bytes = buf.freeze();
        let decoded = decode_sequence(&mut bytes).unwrap();
        assert_eq!(decoded[0].get_string("app"), Some("live"));
    }

    #[test]
    fn test_nesting_limit() {
        // 100 nested strict arrays of length 1
        let mut buf = BytesMut::new();
        for _ in 0..100 {
            buf.put_u8(MARKER_STRICT_ARRAY);
            buf.put_u32(1);
        }
        buf.put_u8(MARKER_NULL);

        let mut bytes = buf.freeze();
        assert!(matches!(
            decode_sequence(&mut bytes),
            Err(AmfError::NestingTooDeep)
        ));
    }
}
