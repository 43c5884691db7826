//! Artifact storage for hopper.
//!
//! This crate provides:
//! - Staging artifacts keyed by session id, written chunk-by-chunk at offsets
//! - Promotion of a staging artifact to a permanent, uniquely named artifact
//! - A local filesystem backend with path traversal protection

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::ArtifactStore;

use hopper_core::config::StorageConfig;
use std::sync::Arc;

/// Create an artifact store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ArtifactStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            staging_path,
            permanent_path,
        } => {
            let backend = FilesystemBackend::new(staging_path, permanent_path).await?;
            Ok(Arc::new(backend))
        }
    }
}
