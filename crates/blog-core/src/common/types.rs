//! # Blog Record Identifiers
//!
//! [`BlogId`] is the opaque key every stored post is addressed by. It is a
//! 12-byte value rendered as 24 lowercase hexadecimal characters, laid out the
//! way document stores lay out their object ids:
//!
//! ```text
//!  0               4                   9           12
//!  +---------------+-------------------+-----------+
//!  | unix seconds  | process random    | counter   |
//!  | (big-endian)  | (5 bytes)         | (BE, 24b) |
//!  +---------------+-------------------+-----------+
//! ```
//!
//! The service never interprets an id beyond checking that it is well-formed;
//! the layout only serves to make generated ids unique across processes and
//! roughly ordered by creation time.

use core::{fmt, str::FromStr};
use portable_atomic::{AtomicU32, Ordering};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of raw bytes in a [`BlogId`].
pub const BLOG_ID_SIZE: usize = 12;

/// Number of characters in the rendered form of a [`BlogId`].
pub const BLOG_ID_HEX_LEN: usize = BLOG_ID_SIZE * 2;

const COUNTER_MASK: u32 = 0x00FF_FFFF;

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(rand::random);
static COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::random()));

/// Reasons a string is rejected as a [`BlogId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdError {
    InvalidLength { len: usize },
    InvalidCharacter { c: char, index: usize },
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { len } => {
                write!(f, "invalid length: {len} (expected {BLOG_ID_HEX_LEN})")
            }
            Self::InvalidCharacter { c, index } => {
                write!(f, "invalid character {c:?} at position {index}")
            }
        }
    }
}

impl core::error::Error for IdError {}

/// Opaque, system-assigned identifier of a blog post.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlogId([u8; BLOG_ID_SIZE]);

impl BlogId {
    /// Generates a fresh identifier.
    ///
    /// Ids generated by one process never repeat unless more than 2^24 ids are
    /// generated within the same second.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0_u8; BLOG_ID_SIZE];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parses the 24-character hexadecimal form. Upper and lower case digits
    /// are both accepted.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when the input has the wrong length or contains a
    /// non-hexadecimal character.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.len() != BLOG_ID_HEX_LEN {
            return Err(IdError::InvalidLength { len: s.len() });
        }

        let mut bytes = [0_u8; BLOG_ID_SIZE];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| match e {
            hex::FromHexError::InvalidHexCharacter { c, index } => {
                IdError::InvalidCharacter { c, index }
            }
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                IdError::InvalidLength { len: s.len() }
            }
        })?;
        Ok(Self(bytes))
    }

    pub const fn from_bytes(bytes: [u8; BLOG_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; BLOG_ID_SIZE] {
        &self.0
    }

    /// Lowercase hexadecimal rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time embedded in the id, in seconds since the Unix epoch.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlogId({})", self.to_hex())
    }
}

impl FromStr for BlogId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BlogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
