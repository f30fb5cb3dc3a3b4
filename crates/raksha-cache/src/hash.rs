//! Content digests for cached payloads
//!
//! Every payload body stored in a generation is addressed by its Blake3
//! digest, so two resources with identical bytes share one blob.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 digest of a payload body
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 16 hex chars, for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Errors parsing a hex digest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// Not valid hex
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),

    /// Wrong number of bytes
    #[error("invalid digest length: expected 32, got {0}")]
    InvalidLength(usize),
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_digest() {
        assert_eq!(ContentHash::compute(b"shell"), ContentHash::compute(b"shell"));
        assert_ne!(ContentHash::compute(b"shell"), ContentHash::compute(b"shell2"));
    }

    #[test]
    fn hex_roundtrip() {
        let hash = ContentHash::compute(b"index.html");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(hash.short().len(), 16);
    }

    #[test]
    fn rejects_short_digest() {
        assert_eq!(
            "abcd".parse::<ContentHash>(),
            Err(HashError::InvalidLength(2))
        );
    }
}
