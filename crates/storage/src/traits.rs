//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Two-area artifact store.
///
/// The staging area holds in-progress artifacts keyed by session id and is
/// never exposed to clients. The permanent area holds validated artifacts keyed
/// by their generated unique name. Keys in both areas are single, flat path
/// components.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Write `data` into the staging artifact `key` at `offset`, creating the
    /// artifact if needed. The write is durable when this returns.
    async fn write_staged(&self, key: &str, offset: u64, data: Bytes) -> StorageResult<()>;

    /// Read a whole staging artifact.
    async fn read_staged(&self, key: &str) -> StorageResult<Bytes>;

    /// Current size of a staging artifact.
    async fn staged_size(&self, key: &str) -> StorageResult<u64>;

    /// Remove a staging artifact. Returns false if it did not exist.
    async fn remove_staged(&self, key: &str) -> StorageResult<bool>;

    /// List all staging artifact keys.
    async fn list_staged(&self) -> StorageResult<Vec<String>>;

    /// Move staging artifact `key` to the permanent area as `name`.
    ///
    /// Never overwrites: fails with `AlreadyExists` if `name` is taken. On
    /// failure the staging artifact is left in place.
    async fn promote(&self, key: &str, name: &str) -> StorageResult<()>;

    /// Check if a permanent artifact exists.
    async fn permanent_exists(&self, name: &str) -> StorageResult<bool>;

    /// Read a whole permanent artifact.
    async fn read_permanent(&self, name: &str) -> StorageResult<Bytes>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    ///
    /// Called during server startup so the storage is known to be usable before
    /// accepting requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
