//! Server test utilities.

use hopper_core::config::{AppConfig, PolicyConfig, StorageConfig};
use hopper_server::{AppState, create_router};
use hopper_storage::FilesystemBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server accepting PNG uploads of up to 1 KiB.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with a custom config modifier.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let staging_path = temp_dir.path().join("staging");
        let permanent_path = temp_dir.path().join("uploads");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            staging_path: staging_path.clone(),
            permanent_path: permanent_path.clone(),
        };
        config.policy = PolicyConfig {
            max_size: 1024,
            allowed_extensions: vec!["png".to_string()],
            allowed_mime_types: vec!["image/png".to_string()],
            default_chunk_size: 512,
            ..Default::default()
        };
        modifier(&mut config);

        let store = Arc::new(
            FilesystemBackend::new(staging_path, permanent_path)
                .await
                .expect("Failed to create storage backend"),
        );

        hopper_server::metrics::register_metrics();
        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn permanent_dir(&self) -> PathBuf {
        self._temp_dir.path().join("uploads")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self._temp_dir.path().join("staging")
    }

    /// Sorted file names in `dir`.
    pub fn files_in(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
