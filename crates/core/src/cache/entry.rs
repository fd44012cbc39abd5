//! Cached item model.
//!
//! A [`CacheEntry`] is what every backend stores and returns. Its value is a
//! closed sum type so that text, binary, path and structured payloads survive
//! a round trip through storage exactly.

use std::fmt;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Routing tag selecting the default TTL and the storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Image,
    Metadata,
    Robots,
    #[serde(other)]
    Generic,
}

impl ContentKind {
    /// Every kind, in the order the file backend probes its partitions.
    pub const ALL: [ContentKind; 5] = [Self::Html, Self::Image, Self::Metadata, Self::Robots, Self::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Image => "image",
            Self::Metadata => "metadata",
            Self::Robots => "robots",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized tags route to [`ContentKind::Generic`].
impl From<&str> for ContentKind {
    fn from(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "html" => Self::Html,
            "image" => Self::Image,
            "metadata" => Self::Metadata,
            "robots" => Self::Robots,
            _ => Self::Generic,
        }
    }
}

/// A cached payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    Binary(Vec<u8>),
    Path(PathBuf),
    Structured(Value),
}

const TAG_KIND: &str = "kind";
const TAG_VALUE: &str = "value";

impl CacheValue {
    /// Encode into the stored JSON form.
    ///
    /// Text maps to a bare string, binary and path values are wrapped as
    /// `{"kind": ..., "value": ...}`. A structured value that would read back
    /// as one of those shapes is wrapped with kind `json`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Binary(bytes) => tagged("bytes", Value::String(BASE64.encode(bytes))),
            Self::Path(path) => tagged("path", Value::String(path.to_string_lossy().into_owned())),
            Self::Structured(value) if is_ambiguous(value) => tagged("json", value.clone()),
            Self::Structured(value) => value.clone(),
        }
    }

    /// Decode the stored JSON form produced by [`CacheValue::to_json`].
    pub fn from_json(value: Value) -> Result<Self, Error> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) if is_tagged_shape(&map) => {
                let kind = map.get(TAG_KIND).and_then(Value::as_str).unwrap_or_default().to_string();
                let inner = map.get(TAG_VALUE).cloned().unwrap_or(Value::Null);
                match (kind.as_str(), inner) {
                    ("bytes", Value::String(encoded)) => BASE64
                        .decode(encoded.as_bytes())
                        .map(Self::Binary)
                        .map_err(|e| Error::Corrupted(format!("invalid base64 payload: {e}"))),
                    ("path", Value::String(path)) => Ok(Self::Path(PathBuf::from(path))),
                    ("json", inner) => Ok(Self::Structured(inner)),
                    (kind, _) => Err(Error::Corrupted(format!("malformed `{kind}` wrapper"))),
                }
            }
            other => Ok(Self::Structured(other)),
        }
    }

    /// Advisory byte size: raw length for text and binary, encoded length otherwise.
    ///
    /// Returns 0 when the value cannot be encoded.
    pub fn estimate_size(&self) -> u64 {
        match self {
            Self::Text(text) => text.len() as u64,
            Self::Binary(bytes) => bytes.len() as u64,
            other => match serde_json::to_vec(&other.to_json()) {
                Ok(encoded) => encoded.len() as u64,
                Err(e) => {
                    tracing::debug!(error = %e, "size estimation failed");
                    0
                }
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_structured(self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value),
            _ => None,
        }
    }

    /// Variant name, for logs.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Path(_) => "path",
            Self::Structured(_) => "structured",
        }
    }
}

impl From<String> for CacheValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for CacheValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<PathBuf> for CacheValue {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

fn tagged(kind: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(2);
    map.insert(TAG_KIND.to_string(), Value::String(kind.to_string()));
    map.insert(TAG_VALUE.to_string(), value);
    Value::Object(map)
}

fn is_tagged_shape(map: &Map<String, Value>) -> bool {
    map.len() == 2 && map.get(TAG_KIND).is_some_and(Value::is_string) && map.contains_key(TAG_VALUE)
}

fn is_ambiguous(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Object(map) => is_tagged_shape(map),
        _ => false,
    }
}

/// A cached item together with the bookkeeping needed for expiry and decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: CacheValue,
    pub created_at: DateTime<Utc>,
    /// Seconds to live; `<= 0` never expires.
    pub ttl: i64,
    pub content_type: ContentKind,
    pub size_bytes: u64,
    /// Whether the stored bytes of this entry are gzip-compressed.
    pub compressed: bool,
}

impl CacheEntry {
    /// Build a fresh entry stamped with the current time.
    pub fn new(
        key: impl Into<String>, value: CacheValue, ttl: i64, content_type: ContentKind, compressed: bool,
    ) -> Self {
        let size_bytes = value.estimate_size();
        Self { key: key.into(), value, created_at: Utc::now(), ttl, content_type, size_bytes, compressed }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// TTLs too large to represent as a deadline never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.ttl <= 0 {
            return false;
        }
        Duration::try_seconds(self.ttl)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .is_some_and(|deadline| now > deadline)
    }
}
