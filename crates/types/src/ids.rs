//! Identifier newtypes.

use serde::{Serialize, Serializer};
use std::fmt;

/// A 32-byte block identifier assigned by the chain engine.
///
/// Opaque to this subsystem; compared byte-for-byte for ancestry checks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId([u8; 32]);

impl BlockId {
    /// Size of the identifier in bytes.
    pub const BYTES: usize = 32;

    /// All-zero identifier.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wrap raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// A 32-byte transaction identifier, the trace-buffer key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    /// Size of the identifier in bytes.
    pub const BYTES: usize = 32;

    /// Wrap raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_roundtrip() {
        let id = BlockId::from_bytes([7u8; 32]);
        assert_eq!(id.as_bytes(), &[7u8; 32]);
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_zero_id() {
        assert_eq!(BlockId::ZERO.as_bytes(), &[0u8; 32]);
    }
}
