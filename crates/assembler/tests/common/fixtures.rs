use super::mocks::{FlakyStore, RecordingAuditSink};
use bytes::Bytes;
use hopper_assembler::{AppendChunk, ChunkReceipt, UploadAssembler, UploadResult};
use hopper_core::SessionId;
use hopper_core::config::{GcConfig, PolicyConfig};
use hopper_storage::FilesystemBackend;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Minimal PDF document; sniffs as `application/pdf`.
#[allow(dead_code)]
pub const PDF_BYTES: &[u8] =
    b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n";

/// Encode a solid-color RGB PNG.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Allow-list `{png}`, max size 1024 bytes.
#[allow(dead_code)]
pub fn png_only_policy() -> PolicyConfig {
    PolicyConfig {
        max_size: 1024,
        allowed_extensions: vec!["png".to_string()],
        allowed_mime_types: vec!["image/png".to_string()],
        default_chunk_size: 512,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn sid(s: &str) -> SessionId {
    SessionId::parse(s).unwrap()
}

#[allow(dead_code)]
pub fn chunk_request(
    session: &str,
    index: u32,
    data: &[u8],
    name: &str,
    total_size: u64,
) -> AppendChunk {
    AppendChunk {
        session_id: sid(session),
        index,
        data: Bytes::copy_from_slice(data),
        declared_name: name.to_string(),
        total_size,
        client_addr: Some("192.0.2.10".parse().unwrap()),
    }
}

/// Append chunk `index` of `payload` split into `chunk_size` pieces.
#[allow(dead_code)]
pub async fn append(
    assembler: &UploadAssembler,
    session: &str,
    name: &str,
    payload: &[u8],
    chunk_size: usize,
    index: u32,
) -> UploadResult<ChunkReceipt> {
    let start = index as usize * chunk_size;
    let end = (start + chunk_size).min(payload.len());
    assembler
        .append_chunk(chunk_request(
            session,
            index,
            &payload[start..end],
            name,
            payload.len() as u64,
        ))
        .await
}

/// An assembler over a temp-dir filesystem store wrapped in [`FlakyStore`].
#[allow(dead_code)]
pub struct TestAssembler {
    pub assembler: Arc<UploadAssembler>,
    pub store: Arc<FlakyStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestAssembler {
    pub async fn new(policy: PolicyConfig) -> Self {
        Self::with_gc(policy, GcConfig::default()).await
    }

    pub async fn with_gc(policy: PolicyConfig, gc: GcConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("staging"), dir.path().join("uploads"))
            .await
            .unwrap();
        let store = Arc::new(FlakyStore::new(backend));
        let audit = Arc::new(RecordingAuditSink::default());
        let assembler = Arc::new(UploadAssembler::new(policy, gc, store.clone(), audit.clone()));
        Self {
            assembler,
            store,
            audit,
            dir,
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    pub fn permanent_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// File names currently in a directory, sorted.
    pub fn files_in(&self, dir: PathBuf) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}
