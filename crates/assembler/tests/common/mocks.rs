use async_trait::async_trait;
use bytes::Bytes;
use hopper_assembler::{AuditAction, AuditEvent, AuditSink};
use hopper_storage::{ArtifactStore, FilesystemBackend, StorageError, StorageResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Filesystem store with switchable failure injection and call counters.
#[allow(dead_code)]
pub struct FlakyStore {
    inner: FilesystemBackend,
    pub fail_writes: AtomicBool,
    pub fail_promotes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub writes: AtomicU64,
    pub reads: AtomicU64,
    pub promotes: AtomicU64,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_promotes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            promotes: AtomicU64::new(0),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_promotes(&self, fail: bool) {
        self.fail_promotes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn promotes(&self) -> u64 {
        self.promotes.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> StorageError {
        StorageError::Io(std::io::Error::other(format!("injected {op} failure")))
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn write_staged(&self, key: &str, offset: u64, data: Bytes) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("write"));
        }
        self.inner.write_staged(key, offset, data).await
    }

    async fn read_staged(&self, key: &str) -> StorageResult<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        self.inner.read_staged(key).await
    }

    async fn staged_size(&self, key: &str) -> StorageResult<u64> {
        self.inner.staged_size(key).await
    }

    async fn remove_staged(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove_staged(key).await
    }

    async fn list_staged(&self) -> StorageResult<Vec<String>> {
        self.inner.list_staged().await
    }

    async fn promote(&self, key: &str, name: &str) -> StorageResult<()> {
        self.promotes.fetch_add(1, Ordering::SeqCst);
        if self.fail_promotes.load(Ordering::SeqCst) {
            return Err(Self::injected("promote"));
        }
        self.inner.promote(key, name).await
    }

    async fn permanent_exists(&self, name: &str) -> StorageResult<bool> {
        self.inner.permanent_exists(name).await
    }

    async fn read_permanent(&self, name: &str) -> StorageResult<Bytes> {
        self.inner.read_permanent(name).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Keeps every audit event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

#[allow(dead_code)]
impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&AuditAction) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches(&e.action))
            .count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
