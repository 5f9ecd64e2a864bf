//! DER encoding of entitlements for special slot -7.
//!
//! Entitlements are mapped onto ASN.1 as follows:
//! - boolean → BOOLEAN (0x01)
//! - integer → INTEGER (0x02)
//! - string → UTF8String (0x0c)
//! - array → SEQUENCE (0x30)
//! - dictionary → SET (0x31) of SEQUENCE { UTF8String key, value }
//!
//! Data, date and real values have no encoding and are rejected.

use plist::Value;

const DER_TAG_BOOLEAN: u8 = 0x01;
const DER_TAG_INTEGER: u8 = 0x02;
const DER_TAG_UTF8STRING: u8 = 0x0c;
const DER_TAG_SEQUENCE: u8 = 0x30;
const DER_TAG_SET: u8 = 0x31;

/// Encode a DER length (short form below 128, long form above).
fn encode_length(output: &mut Vec<u8>, length: usize) {
    if length < 128 {
        output.push(length as u8);
    } else {
        let bytes_needed = (usize::BITS as usize - length.leading_zeros() as usize).div_ceil(8);
        output.push(0x80 | bytes_needed as u8);
        for i in (0..bytes_needed).rev() {
            output.push(((length >> (i * 8)) & 0xff) as u8);
        }
    }
}

fn encode_tagged(output: &mut Vec<u8>, tag: u8, content: &[u8]) {
    output.push(tag);
    encode_length(output, content.len());
    output.extend(content);
}

/// Minimal two's complement big-endian encoding of an integer.
fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn encode_value(output: &mut Vec<u8>, value: &Value) -> Result<(), String> {
    match value {
        Value::Boolean(b) => {
            encode_tagged(output, DER_TAG_BOOLEAN, &[if *b { 0xff } else { 0x00 }])
        }
        Value::Integer(i) => {
            let signed = i
                .as_signed()
                .ok_or_else(|| format!("integer {i:?} does not fit in 64 bits"))?;
            encode_tagged(output, DER_TAG_INTEGER, &integer_content(signed));
        }
        Value::String(s) => encode_tagged(output, DER_TAG_UTF8STRING, s.as_bytes()),
        Value::Array(items) => {
            let mut content = Vec::new();
            for item in items {
                encode_value(&mut content, item)?;
            }
            encode_tagged(output, DER_TAG_SEQUENCE, &content);
        }
        Value::Dictionary(dict) => {
            // Pairs follow Apple's lexical key order, which codesign
            // expects over strict DER SET OF ordering.
            let mut keys: Vec<&String> = dict.keys().collect();
            keys.sort();

            let mut content = Vec::new();
            for key in keys {
                let mut pair = Vec::new();
                encode_tagged(&mut pair, DER_TAG_UTF8STRING, key.as_bytes());
                if let Some(value) = dict.get(key) {
                    encode_value(&mut pair, value)?;
                }
                encode_tagged(&mut content, DER_TAG_SEQUENCE, &pair);
            }
            encode_tagged(output, DER_TAG_SET, &content);
        }
        other => return Err(format!("unsupported entitlement value {other:?}")),
    }

    Ok(())
}

/// Encode an entitlements property list as DER.
pub fn entitlements_to_der(value: &Value) -> Result<Vec<u8>, String> {
    let mut output = Vec::new();
    encode_value(&mut output, value)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Dictionary;

    fn der(value: Value) -> Vec<u8> {
        entitlements_to_der(&value).unwrap()
    }

    #[test]
    fn test_encode_length_short() {
        let mut buf = Vec::new();
        encode_length(&mut buf, 10);
        assert_eq!(buf, vec![10]);
    }

    #[test]
    fn test_encode_length_long() {
        let mut buf = Vec::new();
        encode_length(&mut buf, 256);
        assert_eq!(buf, vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_boolean() {
        assert_eq!(der(Value::Boolean(true)), vec![0x01, 0x01, 0xff]);
        assert_eq!(der(Value::Boolean(false)), vec![0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_string() {
        assert_eq!(
            der(Value::String("test".into())),
            vec![0x0c, 0x04, b't', b'e', b's', b't']
        );
    }

    #[test]
    fn test_encode_integers() {
        assert_eq!(der(Value::Integer(0.into())), vec![0x02, 0x01, 0x00]);
        assert_eq!(der(Value::Integer(42.into())), vec![0x02, 0x01, 0x2a]);
        assert_eq!(der(Value::Integer(128.into())), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(der(Value::Integer(256.into())), vec![0x02, 0x02, 0x01, 0x00]);
        assert_eq!(der(Value::Integer((-1).into())), vec![0x02, 0x01, 0xff]);
    }

    #[test]
    fn test_encode_dictionary_sorted_by_key() {
        let mut dict = Dictionary::new();
        dict.insert("b".into(), Value::Boolean(true));
        dict.insert("a".into(), Value::String("x".into()));

        assert_eq!(
            der(Value::Dictionary(dict)),
            vec![
                0x31, 0x10, // SET
                0x30, 0x06, 0x0c, 0x01, b'a', 0x0c, 0x01, b'x', // a => "x"
                0x30, 0x06, 0x0c, 0x01, b'b', 0x01, 0x01, 0xff, // b => true
            ]
        );
    }

    #[test]
    fn test_encode_empty_dictionary() {
        assert_eq!(der(Value::Dictionary(Dictionary::new())), vec![0x31, 0x00]);
    }

    #[test]
    fn test_rejects_data_values() {
        assert!(entitlements_to_der(&Value::Data(vec![1, 2, 3])).is_err());
    }
}
