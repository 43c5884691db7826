//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// The endpoint is unauthenticated; restrict it at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Storage backend configuration.
///
/// Both roots must live outside any publicly served tree; access control for
/// them is the host's responsibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for in-progress staging artifacts.
        staging_path: PathBuf,
        /// Root directory for validated permanent artifacts.
        permanent_path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            staging_path: PathBuf::from("./data/staging"),
            permanent_path: PathBuf::from("./data/uploads"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem {
                staging_path,
                permanent_path,
            } => {
                if staging_path == permanent_path {
                    return Err(
                        "storage.staging_path and storage.permanent_path must be different directories"
                            .to_string(),
                    );
                }
                if permanent_path.starts_with(staging_path)
                    || staging_path.starts_with(permanent_path)
                {
                    return Err(
                        "storage.staging_path and storage.permanent_path must not be nested"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}

/// Validation policy applied to every upload.
///
/// Allow-lists and limits are data so the same pipeline serves different
/// deployments without code changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum assembled upload size in bytes (default: 5 MiB).
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Allowed file extensions, compared case-insensitively.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Allowed MIME types as detected from the content bytes.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// Chunk size for sessions opened without an explicit chunk size.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u64,
    /// Maximum length of the sanitized base name used for permanent naming.
    #[serde(default = "default_max_base_name_len")]
    pub max_base_name_len: usize,
    /// Maximum width or height accepted for image uploads.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
}

fn default_max_size() -> u64 {
    crate::DEFAULT_MAX_SIZE
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/gif", "application/pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_base_name_len() -> usize {
    100
}

fn default_max_image_dimension() -> u32 {
    10_000
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            allowed_extensions: default_allowed_extensions(),
            allowed_mime_types: default_allowed_mime_types(),
            default_chunk_size: default_chunk_size(),
            max_base_name_len: default_max_base_name_len(),
            max_image_dimension: default_max_image_dimension(),
        }
    }
}

impl PolicyConfig {
    /// Whether `extension` is in the allow-list (case-insensitive).
    pub fn allows_extension(&self, extension: &str) -> bool {
        !extension.is_empty()
            && self
                .allowed_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Whether `mime` is in the allow-list (case-insensitive).
    pub fn allows_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime))
    }

    /// Validate policy configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("policy.max_size cannot be 0".to_string());
        }
        if self.default_chunk_size == 0 {
            return Err("policy.default_chunk_size cannot be 0".to_string());
        }
        if self.default_chunk_size > self.max_size {
            return Err(format!(
                "policy.default_chunk_size {} exceeds policy.max_size {}",
                self.default_chunk_size, self.max_size
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err("policy.allowed_extensions cannot be empty".to_string());
        }
        if self.allowed_mime_types.is_empty() {
            return Err("policy.allowed_mime_types cannot be empty".to_string());
        }
        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|e| e.is_empty() || e.contains('.') || e.contains('/'))
        {
            return Err(format!(
                "policy.allowed_extensions entry {ext:?} must be a bare extension like \"png\""
            ));
        }
        if self.max_base_name_len == 0 {
            return Err("policy.max_base_name_len cannot be 0".to_string());
        }
        if self.max_image_dimension == 0 {
            return Err("policy.max_image_dimension cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Idle-session garbage collection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Seconds an open session may go without a chunk before it is discarded.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds a completed or rejected session record is kept so repeated
    /// finalize calls return the same result.
    #[serde(default = "default_terminal_retention_secs")]
    pub terminal_retention_secs: u64,
    /// Interval in seconds between background sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Remove staging artifacts left behind by a previous process at startup.
    #[serde(default = "default_purge_orphans_on_startup")]
    pub purge_orphans_on_startup: bool,
}

fn default_idle_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_terminal_retention_secs() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_purge_orphans_on_startup() -> bool {
    true
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            terminal_retention_secs: default_terminal_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            purge_orphans_on_startup: default_purge_orphans_on_startup(),
        }
    }
}

impl GcConfig {
    /// Get the idle timeout as a Duration.
    pub fn idle_timeout(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        Duration::seconds(i64::try_from(self.idle_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Get the terminal retention period as a Duration.
    pub fn terminal_retention(&self) -> Duration {
        Duration::seconds(i64::try_from(self.terminal_retention_secs).unwrap_or(i64::MAX))
    }

    /// Get the sweep interval as a std::time::Duration.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate GC configuration.
    pub fn validate(&self) -> Result<(), String> {
        // Zero would make tokio::time::interval panic.
        if self.sweep_interval_secs == 0 {
            return Err("gc.sweep_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Pre-authorization for the HTTP surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// SHA-256 hex of the bearer token accepted on upload routes.
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

impl AuthConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Accepts the bearer token `test-upload-token`.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-upload-token"
            token_hash: crate::hash::ContentHash::compute(b"test-upload-token").to_hex(),
        }
    }

    /// Validate the token hash format.
    pub fn validate(&self) -> Result<(), String> {
        let hash = self.token_hash.trim();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("auth.token_hash must be 64 hex characters (SHA-256)".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Validation policy.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Idle-session garbage collection.
    #[serde(default)]
    pub gc: GcConfig,
    /// Upload route authorization (required).
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            policy: PolicyConfig::default(),
            gc: GcConfig::default(),
            auth: AuthConfig::for_testing(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.storage.validate().map_err(crate::Error::Config)?;
        self.policy.validate().map_err(crate::Error::Config)?;
        self.gc.validate().map_err(crate::Error::Config)?;
        self.auth.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}
