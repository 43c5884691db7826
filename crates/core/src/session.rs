//! Upload session types and lifecycle.

use crate::chunk::ChunkRecord;
use crate::policy::Violation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use time::OffsetDateTime;

/// Client-supplied identifier for an upload session, stable across chunks.
///
/// The identifier doubles as the staging key, so it is restricted to
/// `[A-Za-z0-9_-]` and at most [`crate::MAX_SESSION_ID_LEN`] characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate a session identifier.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidSessionId(
                "session id cannot be empty".to_string(),
            ));
        }
        if s.len() > crate::MAX_SESSION_ID_LEN {
            return Err(crate::Error::InvalidSessionId(format!(
                "session id is {} characters (max: {})",
                s.len(),
                crate::MAX_SESSION_ID_LEN
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::InvalidSessionId(
                "session id may only contain [A-Za-z0-9_-]".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Session is open and accepting chunks.
    Open,
    /// All chunks arrived and the validation pipeline or promotion is running
    /// (or promotion failed and awaits a retry).
    Finalizing,
    /// Artifact was validated and promoted to permanent storage.
    Complete,
    /// Artifact failed validation; staging artifact has been deleted.
    Rejected,
}

impl UploadState {
    /// Check if the session is still active (can receive chunks).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical file being assembled from chunks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Client-supplied session identifier.
    pub id: SessionId,
    /// Client-supplied original file name (untrusted).
    pub declared_name: String,
    /// Declared size of the assembled artifact in bytes.
    pub total_size: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: u64,
    /// Chunks written so far, keyed by index.
    pub received: BTreeMap<u32, ChunkRecord>,
    /// Sum of the sizes of all distinct chunks written.
    pub bytes_written: u64,
    /// Current session state.
    pub state: UploadState,
    /// Address of the client that opened the session.
    pub client_addr: Option<IpAddr>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session last received a chunk or changed state.
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
    /// MIME type sniffed from the assembled bytes (set during finalize).
    pub detected_mime: Option<String>,
    /// Permanent name chosen at finalize.
    pub permanent_name: Option<String>,
    /// Validation failure that rejected the session.
    pub rejection: Option<Violation>,
}

impl UploadSession {
    /// Create a new open session.
    ///
    /// Fails if `total_size` or `chunk_size` is zero or if the layout would
    /// need more than `u32::MAX` chunks.
    pub fn new(
        id: SessionId,
        declared_name: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> crate::Result<Self> {
        if total_size == 0 {
            return Err(crate::Error::InvalidChunkLayout(
                "total size cannot be zero".to_string(),
            ));
        }
        if chunk_size == 0 {
            return Err(crate::Error::InvalidChunkLayout(
                "chunk size cannot be zero".to_string(),
            ));
        }
        // A chunk larger than the whole upload collapses to a single chunk.
        let chunk_size = chunk_size.min(total_size);
        if total_size.div_ceil(chunk_size) > u64::from(u32::MAX) {
            return Err(crate::Error::InvalidChunkLayout(format!(
                "total size {total_size} with chunk size {chunk_size} needs too many chunks"
            )));
        }

        let now = OffsetDateTime::now_utc();
        Ok(Self {
            id,
            declared_name: declared_name.into(),
            total_size,
            chunk_size,
            received: BTreeMap::new(),
            bytes_written: 0,
            state: UploadState::Open,
            client_addr: None,
            created_at: now,
            last_activity_at: now,
            detected_mime: None,
            permanent_name: None,
            rejection: None,
        })
    }

    /// Calculate the expected number of chunks.
    pub fn expected_chunk_count(&self) -> u32 {
        // Bounded by the check in `new`.
        self.total_size.div_ceil(self.chunk_size) as u32
    }

    /// Byte offset of chunk `index` within the assembled artifact.
    pub fn chunk_offset(&self, index: u32) -> u64 {
        u64::from(index) * self.chunk_size
    }

    /// Exact length chunk `index` must have, or `None` if out of range.
    pub fn expected_chunk_len(&self, index: u32) -> Option<u64> {
        if index >= self.expected_chunk_count() {
            return None;
        }
        let offset = self.chunk_offset(index);
        Some(self.chunk_size.min(self.total_size - offset))
    }

    /// Chunk indices in `[0, expected_chunk_count)` not yet received.
    pub fn missing_indices(&self) -> Vec<u32> {
        (0..self.expected_chunk_count())
            .filter(|i| !self.received.contains_key(i))
            .collect()
    }

    /// Whether every chunk index has been received.
    pub fn is_complete(&self) -> bool {
        self.received.len() as u64 == u64::from(self.expected_chunk_count())
    }

    /// Record activity on the session.
    pub fn touch(&mut self) {
        self.last_activity_at = OffsetDateTime::now_utc();
    }

    /// Whether the session has been idle longer than `timeout` at `now`.
    pub fn is_idle(&self, now: OffsetDateTime, timeout: time::Duration) -> bool {
        now - self.last_activity_at > timeout
    }

    /// Key of the session's staging artifact.
    pub fn staging_key(&self) -> &str {
        self.id.as_str()
    }
}
