//! Chunk types and hashing.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chunk hash (SHA-256 of chunk contents).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkHash(ContentHash);

impl ChunkHash {
    /// Compute the hash of chunk data.
    pub fn compute(data: &[u8]) -> Self {
        Self(ContentHash::compute(data))
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A chunk that has been written to a session's staging artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Hash of the chunk bytes as written.
    pub hash: ChunkHash,
    /// Size in bytes.
    pub size: u64,
}

impl ChunkRecord {
    /// Build a record from chunk data.
    pub fn of(data: &[u8]) -> Self {
        Self {
            hash: ChunkHash::compute(data),
            size: data.len() as u64,
        }
    }

    /// Whether `data` is byte-identical to the recorded chunk.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.size == data.len() as u64 && self.hash == ChunkHash::compute(data)
    }
}
