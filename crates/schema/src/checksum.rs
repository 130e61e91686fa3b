use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 128-bit checksum over a normalized static file's content.
///
/// The checksum is the first 16 bytes of a keyed/unkeyed cryptographic
/// digest of the *normalized* bytes of a file (see the normalizer in
/// `verscan-core`). It is the identity key the index store uses to relate
/// static files shipped by different versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Wrap a raw 16-byte digest.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse a checksum from its 32-character lowercase hex form.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not exactly 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, ChecksumParseError> {
        if s.len() != 32 {
            return Err(ChecksumParseError::WrongLength(s.len()));
        }
        let mut out = [0u8; 16];
        hex::decode_to_slice(s, &mut out).map_err(|_| ChecksumParseError::InvalidHex)?;
        Ok(Self(out))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ChecksumParseError {
    #[error("expected 32 hex characters, got {0}")]
    WrongLength(usize),
    #[error("not valid hex")]
    InvalidHex,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let c = Checksum::from_bytes([0xAB; 16]);
        let hex = c.to_hex();
        assert_eq!(Checksum::from_hex(&hex).unwrap(), c);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Checksum::from_hex("abcd").is_err());
    }

    #[test]
    fn serde_json_round_trip() {
        let c = Checksum::from_bytes([0x42; 16]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
