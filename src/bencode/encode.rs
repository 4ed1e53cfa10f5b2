//! Canonical bencode encoder

use super::value::Value;

/// Encodes a value into its canonical byte form.
///
/// Dictionary entries are written in ascending raw byte order of their keys
/// at every nesting depth, which is what makes `info_hash` reproducible.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

/// Appends the canonical encoding of `value` to `buf`.
pub fn encode_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => encode_bytes(b, buf),
        Value::Integer(i) => {
            buf.push(b'i');
            buf.extend_from_slice(i.to_string().as_bytes());
            buf.push(b'e');
        }
        Value::List(items) => {
            buf.push(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dict(entries) => {
            buf.push(b'd');
            // BTreeMap<Vec<u8>, _> iterates in raw byte order
            for (key, val) in entries {
                encode_bytes(key, buf);
                encode_into(val, buf);
            }
            buf.push(b'e');
        }
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&Value::string("spam")), b"4:spam");
        assert_eq!(encode(&Value::Integer(3)), b"i3e");
        assert_eq!(encode(&Value::Integer(-42)), b"i-42e");
        assert_eq!(encode(&Value::Bytes(vec![])), b"0:");
    }

    #[test]
    fn test_encode_list() {
        let list = Value::List(vec![Value::string("spam"), Value::Integer(42)]);
        assert_eq!(encode(&list), b"l4:spami42ee");
    }

    #[test]
    fn test_encode_dict_sorts_keys() {
        let dict = Value::dict([
            ("spam", Value::string("eggs")),
            ("cow", Value::string("moo")),
        ]);
        assert_eq!(encode(&dict), b"d3:cow3:moo4:spam4:eggse");
    }

    #[test]
    fn test_encode_sorts_by_raw_bytes_not_case() {
        // 'Z' (0x5a) sorts before 'a' (0x61)
        let dict = Value::dict([("a", Value::Integer(1)), ("Z", Value::Integer(2))]);
        assert_eq!(encode(&dict), b"d1:Zi2e1:ai1ee");

        let dict = Value::dict([(vec![0xffu8], Value::Integer(1)), (vec![0x01u8], Value::Integer(2))]);
        assert_eq!(encode(&dict), b"d1:\x01i2e1:\xffi1ee");
    }

    #[test]
    fn test_encode_nested_dicts_canonical() {
        let inner = Value::dict([("b", Value::Integer(2)), ("a", Value::Integer(1))]);
        let outer = Value::dict([
            ("z", Value::List(vec![inner.clone()])),
            ("info", inner),
        ]);
        assert_eq!(encode(&outer), b"d4:infod1:ai1e1:bi2ee1:zld1:ai1e1:bi2eeee");
    }

    #[test]
    fn test_reencode_normalizes_unsorted_input() {
        let value = decode(b"d4:spam4:eggs3:cow3:mooe").unwrap();
        assert_eq!(encode(&value), b"d3:cow3:moo4:spam4:eggse");
    }

    #[test]
    fn test_round_trip() {
        let values = vec![
            Value::Integer(i64::MIN),
            Value::Bytes(vec![0, 1, 2, 0xfe, 0xff]),
            Value::List(vec![]),
            Value::Dict(Default::default()),
            Value::dict([
                ("announce", Value::string("http://tracker/announce")),
                (
                    "info",
                    Value::dict([
                        ("length", Value::Integer(92063)),
                        ("name", Value::string("sample.txt")),
                        ("pieces", Value::Bytes(vec![0xaa; 60])),
                        ("nested", Value::List(vec![Value::List(vec![Value::Integer(-1)])])),
                    ]),
                ),
            ]),
        ];

        for value in values {
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }
}
