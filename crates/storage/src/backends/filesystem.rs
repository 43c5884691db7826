//! Local filesystem artifact store.

use crate::error::{StorageError, StorageResult};
use crate::traits::ArtifactStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Prefix for in-flight temp files. Keys may not start with a dot, so these
/// never collide with real artifacts and are skipped by listings.
const TEMP_PREFIX: &str = ".tmp.";

/// Which of the two storage roots a key lives under.
#[derive(Debug, Clone, Copy)]
enum Area {
    Staging,
    Permanent,
}

/// Filesystem artifact store with separate staging and permanent roots.
pub struct FilesystemBackend {
    staging_root: PathBuf,
    permanent_root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating both roots if needed.
    pub async fn new(
        staging_root: impl AsRef<Path>,
        permanent_root: impl AsRef<Path>,
    ) -> StorageResult<Self> {
        let staging_root = staging_root.as_ref().to_path_buf();
        let permanent_root = permanent_root.as_ref().to_path_buf();
        fs::create_dir_all(&staging_root).await?;
        fs::create_dir_all(&permanent_root).await?;
        Ok(Self {
            staging_root,
            permanent_root,
        })
    }

    fn root(&self, area: Area) -> &Path {
        match area {
            Area::Staging => &self.staging_root,
            Area::Permanent => &self.permanent_root,
        }
    }

    /// Resolve a key to a path under the given root, with traversal protection.
    ///
    /// Runs the canonicalize/stat checks on the blocking pool.
    async fn key_path(&self, area: Area, key: &str) -> StorageResult<PathBuf> {
        let root = self.root(area).to_path_buf();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Keys are single path components. Anything that could name a directory,
    /// a parent, or a hidden temp file is rejected. Existing entries (including
    /// dangling symlinks) must resolve inside the root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains(['/', '\\', '\0']) || key.starts_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                let canonical = path.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!(
                            "symlink target missing or invalid: {key}"
                        ))
                    } else {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    }
                })?;

                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                Ok(path)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(path),
            Err(err) => Err(StorageError::Io(std::io::Error::new(
                err.kind(),
                format!("failed to stat path: {err}"),
            ))),
        }
    }

    fn temp_path(&self, area: Area) -> PathBuf {
        self.root(area)
            .join(format!("{TEMP_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Copy `from` into the permanent root under a temp name, fsync it, then
    /// link it into place. Used when a rename crosses filesystems.
    async fn copy_into_place(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let temp_path = self.temp_path(Area::Permanent);
        let result = async {
            fs::copy(from, &temp_path).await?;
            fs::File::open(&temp_path).await?.sync_all().await?;
            fs::hard_link(&temp_path, to).await
        }
        .await;
        let _ = fs::remove_file(&temp_path).await;
        result?;
        Ok(())
    }

    async fn read_file(&self, area: Area, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(area, key).await?;
        let data = fs::read(&path).await.map_err(|e| not_found_or_io(e, key))?;
        Ok(Bytes::from(data))
    }
}

fn not_found_or_io(e: std::io::Error, key: &str) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemBackend {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn write_staged(&self, key: &str, offset: u64, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(Area::Staging, key).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        // Durable before the chunk is acknowledged
        file.sync_data().await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_staged(&self, key: &str) -> StorageResult<Bytes> {
        self.read_file(Area::Staging, key).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn staged_size(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_path(Area::Staging, key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        Ok(metadata.len())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove_staged(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(Area::Staging, key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_staged(&self) -> StorageResult<Vec<String>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.staging_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks; links are never listed
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            results.push(name);
        }
        results.sort();
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn promote(&self, key: &str, name: &str) -> StorageResult<()> {
        let from = self.key_path(Area::Staging, key).await?;
        let to = self.key_path(Area::Permanent, name).await?;

        if !fs::try_exists(&from).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        // hard_link fails if the destination exists, so a concurrent writer of
        // the same name can never be overwritten.
        match fs::hard_link(&from, &to).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()));
            }
            Err(e) if matches!(e.kind(), ErrorKind::CrossesDevices | ErrorKind::Unsupported) => {
                tracing::debug!(key, name, "hard link unavailable, copying across roots");
                self.copy_into_place(&from, &to).await.map_err(|e| match e {
                    StorageError::Io(io) if io.kind() == ErrorKind::AlreadyExists => {
                        StorageError::AlreadyExists(name.to_string())
                    }
                    other => other,
                })?;
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        if let Err(e) = fs::remove_file(&from).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(key, error = %e, "failed to remove promoted staging file");
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn permanent_exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.key_path(Area::Permanent, name).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_permanent(&self, name: &str) -> StorageResult<Bytes> {
        self.read_file(Area::Permanent, name).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        for root in [&self.staging_root, &self.permanent_root] {
            let metadata = fs::metadata(root).await.map_err(|e| {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("storage root not accessible: {e}"),
                ))
            })?;

            if !metadata.is_dir() {
                return Err(StorageError::Io(std::io::Error::new(
                    ErrorKind::NotADirectory,
                    format!("storage root is not a directory: {root:?}"),
                )));
            }
        }

        // Probe writability of the staging root
        let probe = self.temp_path(Area::Staging);
        fs::write(&probe, b"").await?;
        fs::remove_file(&probe).await?;

        Ok(())
    }
}
