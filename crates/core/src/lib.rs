//! Core domain types and shared logic for the hopper upload assembler.
//!
//! This crate defines the data model used across all other crates:
//! - Session identifiers and upload session lifecycle
//! - Chunk hashing for duplicate detection
//! - Validation policy predicates (name, extension, MIME, image structure)
//! - Permanent name generation
//! - Configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod naming;
pub mod policy;
pub mod session;

pub use chunk::{ChunkHash, ChunkRecord};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use naming::permanent_name;
pub use policy::{SanitizedName, Violation};
pub use session::{SessionId, UploadSession, UploadState};

/// Default maximum assembled upload size: 5 MiB
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Default chunk size for explicitly opened sessions: 1 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum length of a client-supplied session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;
