use std::fmt;
use std::str::FromStr;

use crate::{hex, HashError};

/// A 20-byte SHA-1 object name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; ObjectId::LEN]);

impl ObjectId {
    /// Raw digest length in bytes.
    pub const LEN: usize = 20;
    /// Length of the hex form.
    pub const HEX_LEN: usize = 40;
    /// Length of the abbreviated display form.
    pub const SHORT_LEN: usize = 7;
    /// All-zero id, used on the wire for "no object".
    pub const NULL: ObjectId = ObjectId([0; Self::LEN]);

    pub fn from_raw(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let raw: [u8; Self::LEN] =
            bytes
                .try_into()
                .map_err(|_| HashError::InvalidHashLength {
                    expected: Self::LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Parse a full 40-character hex name.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let mut raw = [0u8; Self::LEN];
        hex::decode_into(s, &mut raw)?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// First seven hex digits, for display only; not guaranteed unique.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(Self::SHORT_LEN);
        s
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; Self::LEN]
    }

    /// Fan-out bucket in pack indexes.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Case-insensitive test against an abbreviated hex name.
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        prefix.len() <= Self::HEX_LEN && self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }

    /// `(xx, yyyy…)` split used by the loose object layout.
    pub fn loose_path_parts(&self) -> (String, String) {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        (dir.to_string(), file.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
