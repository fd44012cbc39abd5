//! Byte encoding shared by every backend.
//!
//! An entry is stored as a JSON record
//! `{key, value, created_at, ttl, content_type, size_bytes, compressed}`,
//! gzip-compressed when the entry's `compressed` flag is set. Compressed
//! payloads start with the gzip magic bytes while JSON never does, so a reader
//! can always tell which form it holds without consulting live configuration.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::{CacheEntry, CacheValue, ContentKind};
use crate::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    value: Value,
    created_at: DateTime<Utc>,
    ttl: i64,
    content_type: ContentKind,
    size_bytes: u64,
    compressed: bool,
}

/// Encode an entry into its stored bytes.
pub fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, Error> {
    let record = EntryRecord {
        key: entry.key.clone(),
        value: entry.value.to_json(),
        created_at: entry.created_at,
        ttl: entry.ttl,
        content_type: entry.content_type,
        size_bytes: entry.size_bytes,
        compressed: entry.compressed,
    };
    let json = serde_json::to_vec(&record).map_err(|e| Error::Serialization(e.to_string()))?;

    if entry.compressed { compress(&json) } else { Ok(json) }
}

/// Decode stored bytes back into an entry.
///
/// # Errors
///
/// Returns `Error::Corrupted` for truncated gzip streams, malformed JSON, or
/// value wrappers that do not decode.
pub fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, Error> {
    let json = if is_compressed(bytes) { decompress(bytes)? } else { bytes.to_vec() };
    let record: EntryRecord =
        serde_json::from_slice(&json).map_err(|e| Error::Corrupted(format!("invalid entry record: {e}")))?;

    Ok(CacheEntry {
        key: record.key,
        value: CacheValue::from_json(record.value)?,
        created_at: record.created_at,
        ttl: record.ttl,
        content_type: record.content_type,
        size_bytes: record.size_bytes,
        compressed: record.compressed,
    })
}

pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

fn compress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Corrupted(format!("invalid gzip stream: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: CacheValue, compressed: bool) -> CacheEntry {
        CacheEntry::new("generic:key", value, 60, ContentKind::Generic, compressed)
    }

    #[test]
    fn test_compressed_payload_has_magic() {
        let bytes = encode_entry(&entry("<p>hi</p>".into(), true)).unwrap();
        assert!(is_compressed(&bytes));

        let plain = encode_entry(&entry("<p>hi</p>".into(), false)).unwrap();
        assert!(!is_compressed(&plain));
        assert_eq!(plain[0], b'{');
    }

    #[test]
    fn test_decode_ignores_live_setting() {
        let original = entry(CacheValue::Binary(vec![0xff, 0x00, 0x1f, 0x8b]), true);
        let decoded = decode_entry(&encode_entry(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);

        let original = entry(CacheValue::Structured(json!({"title": "T", "n": [1, 2]})), false);
        let decoded = decode_entry(&encode_entry(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_plain_record_layout() {
        let bytes = encode_entry(&entry(CacheValue::Binary(vec![1, 2, 3]), false)).unwrap();
        let record: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(record["key"], "generic:key");
        assert_eq!(record["value"], json!({"kind": "bytes", "value": "AQID"}));
        assert_eq!(record["ttl"], 60);
        assert_eq!(record["content_type"], "generic");
        assert_eq!(record["size_bytes"], 3);
        assert_eq!(record["compressed"], false);
    }

    #[test]
    fn test_garbage_is_corruption() {
        assert!(matches!(decode_entry(b"not json at all"), Err(Error::Corrupted(_))));
        assert!(matches!(decode_entry(&[0x1f, 0x8b, 0x00, 0x01]), Err(Error::Corrupted(_))));
        assert!(matches!(decode_entry(b""), Err(Error::Corrupted(_))));
    }
}
