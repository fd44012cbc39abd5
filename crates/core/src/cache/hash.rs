//! Content-addressed cache key generation.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex digits of the SHA-256 kept when a key is truncated (128 bits).
pub const TRUNCATED_HASH_LEN: usize = 32;

/// Hex digits of the URL hash used in facade keys.
pub const URL_HASH_LEN: usize = 16;

/// Hex-encoded SHA-256 of arbitrary input.
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    hex::encode(hasher.finalize())
}

/// Content-addressed key for URL-addressed content: `{kind}:{sha256(url)[:16]}`.
pub fn url_key(kind: &str, url: &str) -> String {
    let digest = sha256_hex(url);
    format!("{kind}:{}", &digest[..URL_HASH_LEN])
}

/// One segment of a generated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    UInt(u64),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u64> for KeyPart {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<usize> for KeyPart {
    fn from(n: usize) -> Self {
        Self::UInt(n as u64)
    }
}

/// Join key parts with `:`, bounding the result to `max_key_length` bytes.
///
/// Oversized keys become `<readable-prefix>:<sha256(full)[:32]>`. When the
/// limit leaves no room for a prefix, the key is the hash cut to the limit.
pub fn generate_key(parts: &[KeyPart], max_key_length: usize) -> String {
    let key = parts.iter().map(ToString::to_string).collect::<Vec<_>>().join(":");
    if key.len() <= max_key_length {
        return key;
    }

    let digest = sha256_hex(&key);
    let budget = max_key_length.saturating_sub(TRUNCATED_HASH_LEN + 1);
    if budget == 0 {
        return digest[..max_key_length.min(TRUNCATED_HASH_LEN)].to_string();
    }
    let prefix = floor_char_boundary(&key, budget);
    format!("{}:{}", prefix, &digest[..TRUNCATED_HASH_LEN])
}

fn floor_char_boundary(s: &str, max: usize) -> &str {
    if max >= s.len() {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
