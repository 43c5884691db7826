//! Chunked upload assembly for hopper.
//!
//! [`UploadAssembler`] accepts chunks for client-named sessions, writes them
//! into a staging artifact at fixed offsets, and on finalize runs the
//! validation pipeline before promoting the artifact under a unique permanent
//! name. Sessions are serialized individually; finalize happens at most once.

pub mod assembler;
pub mod audit;
pub mod error;
pub mod gc;

pub use assembler::{
    AppendChunk, ChunkReceipt, FinalizedUpload, OpenSession, SessionSnapshot, UploadAssembler,
};
pub use audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
pub use error::{UploadError, UploadResult};
pub use gc::SweepStats;
