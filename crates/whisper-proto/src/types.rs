//! 32-byte identifiers used across the protocol.

use std::fmt;

use crate::error::CodecError;
use crate::limits::KEY_SIZE;

fn parse_hex32(s: &str) -> Result<[u8; KEY_SIZE], CodecError> {
    let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CodecError::InvalidHex(format!("expected {} bytes, got {}", KEY_SIZE, bytes.len())))
}

/// Storage address of a chat or message record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; KEY_SIZE]);

impl Address {
    pub const ZERO: Self = Self([0u8; KEY_SIZE]);

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        parse_hex32(s).map(Self)
    }
}

impl From<[u8; KEY_SIZE]> for Address {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..16])
    }
}

/// Identity of a chat participant: the Ed25519 verifying key that signs its
/// operations.
///
/// The all-zero value marks an unclaimed participant slot and never matches a
/// real signer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ParticipantId(pub [u8; KEY_SIZE]);

impl ParticipantId {
    pub const UNCLAIMED: Self = Self([0u8; KEY_SIZE]);

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn is_unclaimed(&self) -> bool {
        self.0 == [0u8; KEY_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        parse_hex32(s).map(Self)
    }
}

impl From<[u8; KEY_SIZE]> for ParticipantId {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ParticipantId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", &self.to_hex()[..16])
    }
}
