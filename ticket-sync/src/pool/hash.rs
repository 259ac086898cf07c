//! Chain hash of transactions and blocks.

use std::{fmt, str::FromStr};

/// Size of a [`Hash`] in bytes.
pub const HASH_SIZE: usize = 32;

/// Double BLAKE-256 hash identifying a transaction or block.
///
/// The string form is the hex encoding of the bytes in reverse order, matching the form used by the node and
/// wallet RPC APIs.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Constructs a hash from its internal byte order.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the bytes in internal byte order.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

/// Error parsing a [`Hash`] from its string form.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashParseError {
    /// String is not `2 * HASH_SIZE` characters long.
    #[error("invalid hash string length {0}. expected {len}", len = HASH_SIZE * 2)]
    InvalidLength(usize),
    /// String is not hex.
    #[error("invalid hex. {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_SIZE * 2 {
            return Err(HashParseError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();

        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0;
        bytes.reverse();
        write!(f, "{}", hex::encode(bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}
