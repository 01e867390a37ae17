//! Bencode encoding and decoding
//!
//! Bencode is the encoding used by BitTorrent for storing and transmitting
//! loosely structured data. It supports four data types:
//! - Byte strings
//! - Integers
//! - Lists
//! - Dictionaries
//!
//! Dictionary keys are raw bytes and are emitted in sorted order, so
//! `encode` is canonical and infohashes computed over it are reproducible.

use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf, Bytes};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A bencode value that can be encoded/decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bytes(ByteBuf),
    Int(i64),
    List(Vec<Value>),
    Dict(BTreeMap<ByteBuf, Value>),
}

impl Value {
    /// Decode bencode data into a Value
    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        serde_bencode::from_bytes(data).map_err(|e| crate::Error::BencodeDecode(e.to_string()))
    }

    /// Encode a Value into canonical bencode format
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        serde_bencode::to_bytes(self).map_err(|e| crate::Error::BencodeEncode(e.to_string()))
    }

    /// Build a byte-string value
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(ByteBuf::from(data.into()))
    }

    /// Look up a dictionary entry by raw key
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        match self {
            Value::Dict(dict) => dict.get(Bytes::new(key)),
            _ => None,
        }
    }

    /// Mutable dictionary lookup
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        match self {
            Value::Dict(dict) => dict.get_mut(Bytes::new(key)),
            _ => None,
        }
    }

    /// Insert a dictionary entry, replacing any previous value for the key.
    /// Returns false when self is not a dictionary.
    pub fn insert(&mut self, key: &[u8], value: Value) -> bool {
        match self {
            Value::Dict(dict) => {
                dict.insert(ByteBuf::from(key.to_vec()), value);
                true
            }
            _ => false,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<ByteBuf, Value>> {
        match self {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

/// Read and decode a bencoded file. Any I/O or decode failure yields None so
/// directory scans can continue past unreadable peers.
pub fn load_file<P: AsRef<Path>>(path: P) -> Option<Value> {
    let data = fs::read(path).ok()?;
    Value::decode(&data).ok()
}

/// Encode a value and write it to disk, creating missing parent directories.
pub fn save_file<P: AsRef<Path>>(path: P, value: &Value) -> crate::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, value.encode()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer() {
        let data = b"i42e";
        let value = Value::decode(data).unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[test]
    fn test_decode_string() {
        let data = b"4:spam";
        let value = Value::decode(data).unwrap();
        assert_eq!(value, Value::bytes(&b"spam"[..]));
    }

    #[test]
    fn test_decode_list() {
        let data = b"l4:spami42ee";
        let value = Value::decode(data).unwrap();
        if let Value::List(list) = value {
            assert_eq!(list.len(), 2);
            assert_eq!(list[0], Value::bytes(&b"spam"[..]));
            assert_eq!(list[1], Value::Int(42));
        } else {
            panic!("Expected list");
        }
    }

    #[test]
    fn test_decode_dict_preserves_binary_values() {
        let data = b"d6:pieces4:\x00\x01\x02\x03e";
        let value = Value::decode(data).unwrap();
        assert_eq!(
            value.get(b"pieces").and_then(Value::as_bytes),
            Some(&[0u8, 1, 2, 3][..])
        );
    }

    #[test]
    fn test_encode_sorts_dictionary_keys() {
        let mut value = Value::Dict(BTreeMap::new());
        value.insert(b"zebra", Value::Int(1));
        value.insert(b"apple", Value::Int(2));

        let encoded = value.encode().unwrap();
        assert_eq!(encoded, b"d5:applei2e5:zebrai1ee");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let data = b"d8:announce9:localhost4:infod4:name4:test6:source3:REDee";
        let decoded = Value::decode(data).unwrap();
        assert_eq!(decoded.encode().unwrap(), data.to_vec());
        assert_eq!(Value::decode(&decoded.encode().unwrap()).unwrap(), decoded);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Value::decode(b"not bencoded at all").is_err());
    }

    #[test]
    fn test_load_file_returns_none_for_missing_or_broken() {
        assert!(load_file("/nonexistent/file.torrent").is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.torrent");
        fs::write(&path, b"dthis is not bencode").unwrap();
        assert!(load_file(&path).is_none());
    }

    #[test]
    fn test_save_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.torrent");
        let value = Value::decode(b"d4:spami1ee").unwrap();

        save_file(&path, &value).unwrap();
        assert_eq!(load_file(&path).unwrap(), value);
    }
}
