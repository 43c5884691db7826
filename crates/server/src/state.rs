//! Application state shared across handlers.

use crate::audit::MetricsAuditSink;
use hopper_assembler::{TracingAuditSink, UploadAssembler};
use hopper_core::config::AppConfig;
use hopper_storage::ArtifactStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub assembler: Arc<UploadAssembler>,
}

impl AppState {
    /// Build the assembler over `store`, auditing through tracing and metrics.
    pub fn new(config: AppConfig, store: Arc<dyn ArtifactStore>) -> Self {
        let audit = Arc::new(MetricsAuditSink::new(TracingAuditSink));
        let assembler = Arc::new(UploadAssembler::new(
            config.policy.clone(),
            config.gc.clone(),
            store,
            audit,
        ));
        Self::with_assembler(config, assembler)
    }

    /// Use an existing assembler.
    pub fn with_assembler(config: AppConfig, assembler: Arc<UploadAssembler>) -> Self {
        Self {
            config: Arc::new(config),
            assembler,
        }
    }

    /// Largest chunk body the server will buffer. No single chunk can be
    /// larger than a whole upload.
    pub fn max_chunk_body(&self) -> usize {
        usize::try_from(self.config.policy.max_size).unwrap_or(usize::MAX)
    }
}
