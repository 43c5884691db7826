pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{
    PDF_BYTES, TestAssembler, append, chunk_request, png_bytes, png_only_policy, sid,
};
#[allow(unused_imports)]
pub use mocks::{FlakyStore, RecordingAuditSink};
