//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, trace, warn};

use crate::bencode::{self, Value};
use crate::error::{Result, TorrentError};
use crate::torrent::info::MetaInfo;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<MetaInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let root = bencode::decode(data).map_err(|e| {
            error!("Failed to decode torrent file: {}", e);
            TorrentError::from(e)
        })?;

        Self::from_value(&root)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &Path) -> Result<MetaInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::io_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    /// Extract metadata from an already decoded top-level value
    pub fn from_value(root: &Value) -> Result<MetaInfo> {
        let root_dict = root.as_dict().ok_or(TorrentError::NotADictionary)?;

        let announce_bytes = required(root_dict, "announce")?
            .as_bytes()
            .ok_or_else(|| TorrentError::wrong_type("announce", "byte string"))?;
        let announce = String::from_utf8_lossy(announce_bytes).into_owned();

        let info_value = required(root_dict, "info")?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| TorrentError::wrong_type("info", "dictionary"))?;

        let length = required_integer(info_dict, "length")?;
        let length = u64::try_from(length)
            .map_err(|_| TorrentError::invalid_field("length", format!("must not be negative, got {}", length)))?;

        let piece_length = required_integer(info_dict, "piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::invalid_field(
                "piece length",
                format!("must be positive, got {}", piece_length),
            ));
        }
        let piece_length = piece_length as u64;

        let pieces_bytes = required(info_dict, "pieces")?
            .as_bytes()
            .ok_or_else(|| TorrentError::wrong_type("pieces", "byte string"))?;
        let pieces = MetaInfo::parse_piece_hashes(pieces_bytes)?;

        let name = info_dict
            .get(b"name".as_slice())
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned());

        let info_hash = Self::info_hash(info_value);

        let meta = MetaInfo {
            announce,
            name,
            length,
            piece_length,
            pieces,
            info_hash,
        };

        let expected = meta.expected_piece_count();
        if expected != meta.piece_count() as u64 {
            warn!(
                "Piece count mismatch: length {} / piece length {} implies {} pieces, torrent lists {}",
                meta.length,
                meta.piece_length,
                expected,
                meta.piece_count()
            );
        }

        info!("Parsed torrent: info hash {}, {} pieces", meta.info_hash_hex(), meta.piece_count());
        Ok(meta)
    }

    /// SHA-1 over the canonical re-encoding of an info dictionary
    pub fn info_hash(info: &Value) -> [u8; 20] {
        let canonical = bencode::encode(info);
        trace!("Canonical info dictionary is {} bytes", canonical.len());
        MetaInfo::sha1(&canonical)
    }
}

fn required<'a>(dict: &'a BTreeMap<Vec<u8>, Value>, key: &str) -> Result<&'a Value> {
    dict.get(key.as_bytes()).ok_or_else(|| {
        error!("Torrent is missing required field '{}'", key);
        TorrentError::missing_field(key)
    })
}

fn required_integer(dict: &BTreeMap<Vec<u8>, Value>, key: &str) -> Result<i64> {
    required(dict, key)?
        .as_integer()
        .ok_or_else(|| TorrentError::wrong_type(key, "integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_dict(length: i64, piece_length: i64, pieces: Vec<u8>) -> Value {
        Value::dict([
            ("length", Value::Integer(length)),
            ("name", Value::string("sample.txt")),
            ("piece length", Value::Integer(piece_length)),
            ("pieces", Value::Bytes(pieces)),
        ])
    }

    fn torrent_bytes(info: Value) -> Vec<u8> {
        bencode::encode(&Value::dict([
            ("announce", Value::string("http://tracker.example.com/announce")),
            ("info", info),
        ]))
    }

    #[test]
    fn test_parse_valid_torrent() {
        let data = torrent_bytes(info_dict(40000, 32768, vec![7u8; 40]));
        let meta = TorrentParser::parse_bytes(&data).unwrap();

        assert_eq!(meta.announce, "http://tracker.example.com/announce");
        assert_eq!(meta.name.as_deref(), Some("sample.txt"));
        assert_eq!(meta.length, 40000);
        assert_eq!(meta.piece_length, 32768);
        assert_eq!(meta.pieces, vec![[7u8; 20], [7u8; 20]]);
        assert_eq!(meta.info_hash, MetaInfo::sha1(&bencode::encode(&info_dict(40000, 32768, vec![7u8; 40]))));
    }

    #[test]
    fn test_info_hash_uses_canonical_encoding() {
        let hash = "a".repeat(20);
        let sorted = format!(
            "d8:announce4:http4:infod6:lengthi5e4:name1:x12:piece lengthi5e6:pieces20:{}ee",
            hash
        );
        // info keys deliberately out of order in the raw file
        let unsorted = format!(
            "d8:announce4:http4:infod4:name1:x6:lengthi5e6:pieces20:{}12:piece lengthi5eee",
            hash
        );
        let unsorted = unsorted.as_bytes();

        let sorted_meta = TorrentParser::parse_bytes(sorted.as_bytes()).unwrap();
        let unsorted_meta = TorrentParser::parse_bytes(unsorted).unwrap();
        assert_eq!(sorted_meta.info_hash, unsorted_meta.info_hash);

        // the raw slice of the unsorted info dict would hash differently
        let start = unsorted.windows(5).position(|w| w == b"infod").unwrap() + 4;
        let raw_slice = &unsorted[start..unsorted.len() - 1];
        assert_ne!(MetaInfo::sha1(raw_slice), unsorted_meta.info_hash);
    }

    #[test]
    fn test_missing_info() {
        let data = bencode::encode(&Value::dict([("announce", Value::string("http://t"))]));
        let err = TorrentParser::parse_bytes(&data).unwrap_err();
        assert!(matches!(err, TorrentError::MissingField { ref field } if field == "info"));
    }

    #[test]
    fn test_missing_announce() {
        let data = bencode::encode(&Value::dict([("info", info_dict(1, 1, vec![0; 20]))]));
        let err = TorrentParser::parse_bytes(&data).unwrap_err();
        assert!(matches!(err, TorrentError::MissingField { ref field } if field == "announce"));
    }

    #[test]
    fn test_wrong_type_fields() {
        let data = bencode::encode(&Value::dict([
            ("announce", Value::Integer(1)),
            ("info", info_dict(1, 1, vec![0; 20])),
        ]));
        assert!(matches!(
            TorrentParser::parse_bytes(&data),
            Err(TorrentError::WrongType { ref field, .. }) if field == "announce"
        ));

        let data = torrent_bytes(Value::List(vec![]));
        assert!(matches!(
            TorrentParser::parse_bytes(&data),
            Err(TorrentError::WrongType { ref field, .. }) if field == "info"
        ));
    }

    #[test]
    fn test_missing_length_fields() {
        let info = Value::dict([
            ("piece length", Value::Integer(1)),
            ("pieces", Value::Bytes(vec![0; 20])),
        ]);
        assert!(matches!(
            TorrentParser::parse_bytes(&torrent_bytes(info)),
            Err(TorrentError::MissingField { ref field }) if field == "length"
        ));

        let info = Value::dict([("length", Value::Integer(1)), ("pieces", Value::Bytes(vec![0; 20]))]);
        assert!(matches!(
            TorrentParser::parse_bytes(&torrent_bytes(info)),
            Err(TorrentError::MissingField { ref field }) if field == "piece length"
        ));
    }

    #[test]
    fn test_non_positive_piece_length() {
        let data = torrent_bytes(info_dict(10, 0, vec![0; 20]));
        assert!(matches!(
            TorrentParser::parse_bytes(&data),
            Err(TorrentError::InvalidField { ref field, .. }) if field == "piece length"
        ));
    }

    #[test]
    fn test_malformed_pieces() {
        let data = torrent_bytes(info_dict(10, 10, vec![0; 30]));
        assert!(matches!(
            TorrentParser::parse_bytes(&data),
            Err(TorrentError::MalformedPieces { length: 30 })
        ));
    }

    #[test]
    fn test_not_a_dictionary() {
        assert!(matches!(TorrentParser::parse_bytes(b"l4:spame"), Err(TorrentError::NotADictionary)));
    }

    #[test]
    fn test_malformed_bencode() {
        assert!(matches!(TorrentParser::parse_bytes(b"d8:announce"), Err(TorrentError::Bencode(_))));
    }

    #[test]
    fn test_piece_count_mismatch_is_not_fatal() {
        let data = torrent_bytes(info_dict(100, 10, vec![0; 20]));
        let meta = TorrentParser::parse_bytes(&data).unwrap();
        assert_eq!(meta.piece_count(), 1);
        assert_eq!(meta.expected_piece_count(), 10);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = TorrentParser::parse_file(Path::new("/nonexistent/file.torrent")).unwrap_err();
        assert!(matches!(err, TorrentError::Io { .. }));
    }
}
