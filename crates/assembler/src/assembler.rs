//! Upload session state machine.

use crate::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink};
use crate::error::{UploadError, UploadResult};
use bytes::Bytes;
use hopper_core::config::{GcConfig, PolicyConfig};
use hopper_core::policy;
use hopper_core::{ChunkRecord, SessionId, UploadSession, UploadState, Violation, permanent_name};
use hopper_storage::{ArtifactStore, StorageError};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How many fresh permanent names to try when promotion hits an existing file.
const MAX_NAME_ATTEMPTS: usize = 3;

/// Request to open a session with an explicit chunk layout.
#[derive(Clone, Debug)]
pub struct OpenSession {
    pub session_id: SessionId,
    pub declared_name: String,
    pub total_size: u64,
    /// Defaults to the policy's `default_chunk_size`.
    pub chunk_size: Option<u64>,
    pub client_addr: Option<IpAddr>,
}

/// One chunk delivery.
///
/// `declared_name` and `total_size` must match the session on every chunk.
/// Index 0 on an unknown session opens it with `chunk_size = data.len()`.
#[derive(Clone, Debug)]
pub struct AppendChunk {
    pub session_id: SessionId,
    pub index: u32,
    pub data: Bytes,
    pub declared_name: String,
    pub total_size: u64,
    pub client_addr: Option<IpAddr>,
}

/// Acknowledgement of a durable chunk write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkReceipt {
    pub session_id: SessionId,
    pub index: u32,
    /// The chunk had already been received with identical content.
    pub duplicate: bool,
    pub bytes_written: u64,
    /// Number of chunks still missing.
    pub missing: u32,
}

/// Result of a successful finalize. Repeated finalize calls return the same
/// value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FinalizedUpload {
    pub session_id: SessionId,
    pub permanent_name: String,
    pub mime: String,
    pub size: u64,
    pub dimensions: Option<(u32, u32)>,
}

/// Read-only view of a session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub declared_name: String,
    pub state: UploadState,
    pub total_size: u64,
    pub chunk_size: u64,
    pub expected_chunks: u32,
    pub received: Vec<u32>,
    pub missing: Vec<u32>,
    pub bytes_written: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
    pub permanent_name: Option<String>,
    pub rejection: Option<Violation>,
}

impl SessionSnapshot {
    fn of(session: &UploadSession) -> Self {
        Self {
            session_id: session.id.clone(),
            declared_name: session.declared_name.clone(),
            state: session.state,
            total_size: session.total_size,
            chunk_size: session.chunk_size,
            expected_chunks: session.expected_chunk_count(),
            received: session.received.keys().copied().collect(),
            missing: session.missing_indices(),
            bytes_written: session.bytes_written,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            permanent_name: session.permanent_name.clone(),
            rejection: session.rejection.clone(),
        }
    }
}

/// Registry slot for one session. Guarded by its own lock.
pub(crate) struct SessionEntry {
    pub(crate) session: UploadSession,
    /// Set once validation passes; promotion retries reuse it.
    pub(crate) finalized: Option<FinalizedUpload>,
    /// Set when the session is removed from the registry. A caller that was
    /// queued on the lock must treat the session as unknown.
    pub(crate) discarded: bool,
}

impl SessionEntry {
    fn new(session: UploadSession) -> Self {
        Self {
            session,
            finalized: None,
            discarded: false,
        }
    }
}

pub(crate) type SharedEntry = Arc<Mutex<SessionEntry>>;

/// Assembles chunked uploads and gates them through the validation policy.
///
/// The registry lock is only held to look up or insert entries. All storage
/// I/O happens under the individual session's lock, so sessions progress
/// independently.
pub struct UploadAssembler {
    pub(crate) policy: Arc<PolicyConfig>,
    pub(crate) gc: GcConfig,
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) sessions: Mutex<HashMap<SessionId, SharedEntry>>,
}

impl UploadAssembler {
    pub fn new(
        policy: PolicyConfig,
        gc: GcConfig,
        store: Arc<dyn ArtifactStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            gc,
            store,
            audit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Number of sessions currently tracked, including retained terminal ones.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Open a session with an explicit layout.
    ///
    /// Idempotent for identical parameters. A session that is already open with
    /// a different layout is an `InvalidRequest`.
    #[tracing::instrument(skip(self, req), fields(session_id = %req.session_id, total_size = req.total_size))]
    pub async fn open_session(&self, req: OpenSession) -> UploadResult<SessionSnapshot> {
        let chunk_size = req.chunk_size.unwrap_or(self.policy.default_chunk_size);
        let mut session = UploadSession::new(
            req.session_id.clone(),
            req.declared_name,
            req.total_size,
            chunk_size,
        )?;
        session.client_addr = req.client_addr;

        loop {
            let existing = {
                let mut sessions = self.sessions.lock().await;
                match sessions.get(&req.session_id) {
                    Some(entry) => entry.clone(),
                    None => {
                        let snapshot = SessionSnapshot::of(&session);
                        sessions.insert(
                            req.session_id.clone(),
                            Arc::new(Mutex::new(SessionEntry::new(session))),
                        );
                        tracing::info!(
                            session_id = %req.session_id,
                            expected_chunks = snapshot.expected_chunks,
                            chunk_size = snapshot.chunk_size,
                            "Upload session opened"
                        );
                        self.audit.record(AuditEvent::new(
                            req.session_id.clone(),
                            req.client_addr,
                            AuditAction::Opened,
                            AuditOutcome::Ok,
                        ));
                        return Ok(snapshot);
                    }
                }
            };

            let guard = existing.lock().await;
            if guard.discarded {
                continue;
            }
            let current = &guard.session;
            if current.state != UploadState::Open {
                return Err(UploadError::SessionClosed {
                    state: current.state,
                });
            }
            if current.declared_name != session.declared_name
                || current.total_size != session.total_size
                || current.chunk_size != session.chunk_size
            {
                return Err(UploadError::InvalidRequest(format!(
                    "session {} is already open with a different layout",
                    req.session_id
                )));
            }
            return Ok(SessionSnapshot::of(current));
        }
    }

    /// Write one chunk into the session's staging artifact.
    #[tracing::instrument(
        skip(self, req),
        fields(session_id = %req.session_id, index = req.index, size = req.data.len())
    )]
    pub async fn append_chunk(&self, req: AppendChunk) -> UploadResult<ChunkReceipt> {
        let session_id = req.session_id.clone();
        let client_addr = req.client_addr;
        let index = req.index;

        let result = self.append_inner(req).await;
        let error = result.as_ref().err();
        let rejected = matches!(error, Some(UploadError::SizeExceeded { .. }));
        self.audit_append(session_id, client_addr, index, error, rejected);
        result
    }

    /// Account for a chunk whose body the host stopped reading after
    /// `observed` bytes because it cannot fit under `policy.max_size`.
    ///
    /// An open session is rejected exactly as if the chunk had been appended.
    #[tracing::instrument(skip(self, client_addr), fields(session_id = %session_id))]
    pub async fn reject_oversized_chunk(
        &self,
        session_id: &SessionId,
        index: u32,
        observed: u64,
        client_addr: Option<IpAddr>,
    ) -> UploadError {
        let (err, rejected) = self.oversized_inner(session_id, index, observed).await;
        self.audit_append(session_id.clone(), client_addr, index, Some(&err), rejected);
        err
    }

    /// The error to report, and whether an open session was rejected for it.
    async fn oversized_inner(
        &self,
        session_id: &SessionId,
        index: u32,
        observed: u64,
    ) -> (UploadError, bool) {
        let max = self.policy.max_size;
        let Some(entry) = self.entry(session_id).await else {
            if index != 0 {
                return (UploadError::unknown(session_id), false);
            }
            let err = UploadError::SizeExceeded {
                size: observed,
                max,
            };
            return (err, false);
        };

        let mut guard = entry.lock_owned().await;
        if guard.discarded {
            return (UploadError::unknown(session_id), false);
        }
        if guard.session.state != UploadState::Open {
            let err = UploadError::SessionClosed {
                state: guard.session.state,
            };
            return (err, false);
        }

        let violation = Violation::SizeExceeded {
            size: guard.session.bytes_written.saturating_add(observed),
            max,
        };
        self.reject(&mut guard, violation.clone()).await;
        (violation.into(), true)
    }

    /// One event per chunk delivery, preceded by a rejection event when the
    /// chunk pushed an open session over the size limit.
    fn audit_append(
        &self,
        session_id: SessionId,
        client_addr: Option<IpAddr>,
        index: u32,
        error: Option<&UploadError>,
        rejected: bool,
    ) {
        if let (true, Some(e)) = (rejected, error) {
            self.audit.record(AuditEvent::new(
                session_id.clone(),
                client_addr,
                AuditAction::Rejected,
                AuditOutcome::Failed { code: e.code() },
            ));
        }
        let outcome = match error {
            None => AuditOutcome::Ok,
            Some(e) => AuditOutcome::Failed { code: e.code() },
        };
        self.audit.record(AuditEvent::new(
            session_id,
            client_addr,
            AuditAction::ChunkAppended { index },
            outcome,
        ));
    }

    async fn append_inner(&self, req: AppendChunk) -> UploadResult<ChunkReceipt> {
        if req.data.is_empty() {
            return Err(UploadError::InvalidRequest(
                "chunk body is empty".to_string(),
            ));
        }

        let mut guard = loop {
            let entry = self.lookup_or_open(&req).await?;
            let guard = entry.lock_owned().await;
            if !guard.discarded {
                break guard;
            }
            // Collected while we waited; only index 0 may start it again.
            if req.index != 0 {
                return Err(UploadError::unknown(&req.session_id));
            }
        };

        let session = &mut guard.session;
        if session.state != UploadState::Open {
            return Err(UploadError::SessionClosed {
                state: session.state,
            });
        }
        if req.declared_name != session.declared_name || req.total_size != session.total_size {
            return Err(UploadError::InvalidRequest(format!(
                "chunk {} does not match session name/size ({:?}, {} bytes)",
                req.index, session.declared_name, session.total_size
            )));
        }

        let expected = session.expected_chunk_count();
        let expected_len = session
            .expected_chunk_len(req.index)
            .ok_or(UploadError::InvalidIndex {
                index: req.index,
                expected,
            })?;

        if let Some(record) = session.received.get(&req.index) {
            if !record.matches(&req.data) {
                return Err(UploadError::ChunkConflict { index: req.index });
            }
            session.touch();
            tracing::debug!(index = req.index, "Duplicate chunk ignored");
            return Ok(receipt(session, req.index, true));
        }

        let len = req.data.len() as u64;
        if len != expected_len {
            return Err(UploadError::InvalidRequest(format!(
                "chunk {} must be {expected_len} bytes, got {len}",
                req.index
            )));
        }

        let size = session.bytes_written + len;
        if size > self.policy.max_size {
            let violation = Violation::SizeExceeded {
                size,
                max: self.policy.max_size,
            };
            self.reject(&mut guard, violation.clone()).await;
            return Err(violation.into());
        }

        let record = ChunkRecord::of(&req.data);
        let offset = session.chunk_offset(req.index);
        // A failed write leaves the session open with this index still missing.
        self.store
            .write_staged(session.staging_key(), offset, req.data)
            .await?;

        session.received.insert(req.index, record);
        session.bytes_written = size;
        session.touch();

        Ok(receipt(session, req.index, false))
    }

    /// Find the session's entry, opening it if this is chunk 0 of an unknown id.
    async fn lookup_or_open(&self, req: &AppendChunk) -> UploadResult<SharedEntry> {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get(&req.session_id) {
            return Ok(entry.clone());
        }
        if req.index != 0 {
            return Err(UploadError::unknown(&req.session_id));
        }

        let chunk_size = req.data.len() as u64;
        if chunk_size > req.total_size {
            return Err(UploadError::InvalidRequest(format!(
                "chunk 0 is {chunk_size} bytes but total size is {}",
                req.total_size
            )));
        }
        let mut session = UploadSession::new(
            req.session_id.clone(),
            req.declared_name.clone(),
            req.total_size,
            chunk_size,
        )?;
        session.client_addr = req.client_addr;
        let expected_chunks = session.expected_chunk_count();

        let entry = Arc::new(Mutex::new(SessionEntry::new(session)));
        sessions.insert(req.session_id.clone(), entry.clone());
        tracing::info!(
            session_id = %req.session_id,
            expected_chunks,
            chunk_size,
            "Upload session opened by first chunk"
        );
        self.audit.record(AuditEvent::new(
            req.session_id.clone(),
            req.client_addr,
            AuditAction::Opened,
            AuditOutcome::Ok,
        ));
        Ok(entry)
    }

    /// Validate and promote a fully received session.
    ///
    /// Runs at most once per session: a completed or rejected session returns
    /// its recorded outcome, and a session stuck in `Finalizing` after a
    /// storage failure only retries promotion.
    #[tracing::instrument(skip(self, client_addr), fields(session_id = %session_id))]
    pub async fn finalize(
        &self,
        session_id: &SessionId,
        client_addr: Option<IpAddr>,
    ) -> UploadResult<FinalizedUpload> {
        let mut replayed = false;
        let result = self.finalize_inner(session_id, &mut replayed).await;

        let (action, outcome) = match &result {
            Ok(_) => (AuditAction::Finalized, AuditOutcome::Ok),
            Err(e) if e.is_terminal() => {
                (AuditAction::Rejected, AuditOutcome::Failed { code: e.code() })
            }
            Err(e) => (AuditAction::Finalized, AuditOutcome::Failed { code: e.code() }),
        };
        let event = AuditEvent::new(session_id.clone(), client_addr, action, outcome);
        self.audit
            .record(if replayed { event.replayed() } else { event });

        result
    }

    /// Sets `replayed` when the session was already complete or rejected and
    /// the recorded outcome is returned unchanged.
    async fn finalize_inner(
        &self,
        session_id: &SessionId,
        replayed: &mut bool,
    ) -> UploadResult<FinalizedUpload> {
        let entry = self
            .entry(session_id)
            .await
            .ok_or_else(|| UploadError::unknown(session_id))?;
        let mut guard = entry.lock_owned().await;
        if guard.discarded {
            return Err(UploadError::unknown(session_id));
        }

        if guard.session.state.is_terminal() {
            *replayed = true;
        }
        match guard.session.state {
            UploadState::Complete => {
                return guard.finalized.clone().ok_or(UploadError::SessionClosed {
                    state: UploadState::Complete,
                });
            }
            UploadState::Rejected => {
                return Err(guard
                    .session
                    .rejection
                    .clone()
                    .map(UploadError::from)
                    .unwrap_or(UploadError::SessionClosed {
                        state: UploadState::Rejected,
                    }));
            }
            UploadState::Finalizing => {
                tracing::info!("Retrying promotion of validated upload");
                return self.promote(&mut guard).await;
            }
            UploadState::Open => {}
        }

        let missing = guard.session.missing_indices();
        if !missing.is_empty() {
            return Err(UploadError::IncompleteUpload { missing });
        }

        guard.session.state = UploadState::Finalizing;
        let data = match self.read_assembled(&guard.session).await {
            Ok(data) => data,
            Err(e) => {
                guard.session.state = UploadState::Open;
                return Err(e);
            }
        };
        let size = data.len() as u64;

        let policy = self.policy.clone();
        let declared_name = guard.session.declared_name.clone();
        let evaluated =
            tokio::task::spawn_blocking(move || policy::evaluate(&declared_name, &data, &policy))
                .await;

        let verdict = match evaluated {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(violation)) => {
                self.reject(&mut guard, violation.clone()).await;
                return Err(violation.into());
            }
            Err(e) => {
                guard.session.state = UploadState::Open;
                return Err(UploadError::StorageFailure(StorageError::Io(
                    std::io::Error::other(format!("validation task failed: {e}")),
                )));
            }
        };

        let name = permanent_name(&verdict.name);
        guard.session.detected_mime = Some(verdict.mime.clone());
        guard.session.permanent_name = Some(name.clone());
        guard.finalized = Some(FinalizedUpload {
            session_id: session_id.clone(),
            permanent_name: name,
            mime: verdict.mime,
            size,
            dimensions: verdict.dimensions,
        });

        self.promote(&mut guard).await
    }

    async fn read_assembled(&self, session: &UploadSession) -> UploadResult<Bytes> {
        let data = self.store.read_staged(session.staging_key()).await?;
        if data.len() as u64 != session.total_size {
            return Err(UploadError::StorageFailure(StorageError::Io(
                std::io::Error::other(format!(
                    "staging artifact is {} bytes, expected {}",
                    data.len(),
                    session.total_size
                )),
            )));
        }
        Ok(data)
    }

    /// Move the validated staging artifact into permanent storage.
    ///
    /// On failure the session stays `Finalizing` with its chosen name.
    async fn promote(
        &self,
        guard: &mut OwnedMutexGuard<SessionEntry>,
    ) -> UploadResult<FinalizedUpload> {
        let Some(mut done) = guard.finalized.clone() else {
            return Err(UploadError::SessionClosed {
                state: guard.session.state,
            });
        };

        let mut attempts = 1;
        loop {
            let promoted = self
                .store
                .promote(guard.session.staging_key(), &done.permanent_name)
                .await;
            match promoted {
                Ok(()) => break,
                Err(StorageError::AlreadyExists(taken)) if attempts < MAX_NAME_ATTEMPTS => {
                    attempts += 1;
                    let sanitized = policy::sanitize_name(
                        &guard.session.declared_name,
                        self.policy.max_base_name_len,
                    );
                    done.permanent_name = permanent_name(&sanitized);
                    guard.session.permanent_name = Some(done.permanent_name.clone());
                    guard.finalized = Some(done.clone());
                    tracing::warn!(taken = %taken, "Permanent name taken, retrying with a new name");
                }
                Err(e) => {
                    tracing::error!(
                        permanent_name = %done.permanent_name,
                        error = %e,
                        "Promotion failed, session left finalizing"
                    );
                    return Err(e.into());
                }
            }
        }

        guard.session.state = UploadState::Complete;
        guard.session.touch();
        tracing::info!(
            permanent_name = %done.permanent_name,
            mime = %done.mime,
            size = done.size,
            "Upload finalized"
        );
        Ok(done)
    }

    /// Mark the session rejected and drop its staging artifact.
    async fn reject(&self, entry: &mut SessionEntry, violation: Violation) {
        if let Err(e) = self.store.remove_staged(entry.session.staging_key()).await {
            // The orphan purge picks it up on the next start.
            tracing::warn!(
                session_id = %entry.session.id,
                error = %e,
                "Failed to remove staging artifact of rejected session"
            );
        }
        tracing::info!(
            session_id = %entry.session.id,
            reason = %violation,
            "Upload session rejected"
        );
        entry.session.state = UploadState::Rejected;
        entry.session.rejection = Some(violation);
        entry.finalized = None;
        entry.session.touch();
    }

    /// Status of a session, if it is tracked.
    pub async fn session(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        let entry = self.entry(session_id).await?;
        let guard = entry.lock().await;
        if guard.discarded {
            return None;
        }
        Some(SessionSnapshot::of(&guard.session))
    }

    /// Abandon an open session and delete its staging artifact.
    #[tracing::instrument(skip(self, client_addr), fields(session_id = %session_id))]
    pub async fn abort(
        &self,
        session_id: &SessionId,
        client_addr: Option<IpAddr>,
    ) -> UploadResult<()> {
        let entry = self
            .entry(session_id)
            .await
            .ok_or_else(|| UploadError::unknown(session_id))?;
        let mut guard = entry.clone().lock_owned().await;
        if guard.discarded {
            return Err(UploadError::unknown(session_id));
        }
        if guard.session.state != UploadState::Open {
            return Err(UploadError::SessionClosed {
                state: guard.session.state,
            });
        }

        self.store
            .remove_staged(guard.session.staging_key())
            .await?;
        guard.discarded = true;
        self.forget(session_id, &entry).await;

        tracing::info!(
            bytes_written = guard.session.bytes_written,
            "Upload session aborted"
        );
        self.audit.record(AuditEvent::new(
            session_id.clone(),
            client_addr.or(guard.session.client_addr),
            AuditAction::Aborted,
            AuditOutcome::Ok,
        ));
        Ok(())
    }

    pub(crate) async fn entry(&self, session_id: &SessionId) -> Option<SharedEntry> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Remove `entry` from the registry if it is still the one registered
    /// under `session_id`. Callers hold the entry's lock.
    pub(crate) async fn forget(&self, session_id: &SessionId, entry: &SharedEntry) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            sessions.remove(session_id);
        }
    }
}

fn receipt(session: &UploadSession, index: u32, duplicate: bool) -> ChunkReceipt {
    let expected = u64::from(session.expected_chunk_count());
    ChunkReceipt {
        session_id: session.id.clone(),
        index,
        duplicate,
        bytes_written: session.bytes_written,
        missing: (expected - session.received.len() as u64) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAuditSink;
    use hopper_storage::FilesystemBackend;

    async fn assembler(dir: &tempfile::TempDir) -> UploadAssembler {
        let store = FilesystemBackend::new(dir.path().join("staging"), dir.path().join("uploads"))
            .await
            .unwrap();
        UploadAssembler::new(
            PolicyConfig::default(),
            GcConfig::default(),
            Arc::new(store),
            Arc::new(TracingAuditSink),
        )
    }

    #[test]
    fn receipt_counts_missing_chunks() {
        let mut session =
            UploadSession::new(SessionId::parse("r").unwrap(), "a.png", 25, 10).unwrap();
        session.received.insert(1, ChunkRecord::of(&[0u8; 10]));
        session.bytes_written = 10;

        let receipt = receipt(&session, 1, false);
        assert_eq!(receipt.missing, 2);
        assert_eq!(receipt.bytes_written, 10);
    }

    #[tokio::test]
    async fn open_session_uses_default_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(&dir).await;

        let snapshot = assembler
            .open_session(OpenSession {
                session_id: SessionId::parse("defaults").unwrap(),
                declared_name: "a.pdf".to_string(),
                total_size: 3 * 1024 * 1024 + 1,
                chunk_size: None,
                client_addr: None,
            })
            .await
            .unwrap();

        assert_eq!(snapshot.chunk_size, hopper_core::DEFAULT_CHUNK_SIZE);
        assert_eq!(snapshot.expected_chunks, 4);
        assert_eq!(snapshot.missing, vec![0, 1, 2, 3]);
        assert_eq!(assembler.session_count().await, 1);
    }

    #[tokio::test]
    async fn implicit_open_takes_chunk_size_from_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(&dir).await;

        let receipt = assembler
            .append_chunk(AppendChunk {
                session_id: SessionId::parse("implicit").unwrap(),
                index: 0,
                data: Bytes::from_static(&[7u8; 40]),
                declared_name: "a.pdf".to_string(),
                total_size: 100,
                client_addr: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.missing, 2);

        let snapshot = assembler
            .session(&SessionId::parse("implicit").unwrap())
            .await
            .unwrap();
        assert_eq!(snapshot.chunk_size, 40);
        assert_eq!(snapshot.expected_chunks, 3);
    }

    #[tokio::test]
    async fn first_chunk_larger_than_total_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(&dir).await;

        let err = assembler
            .append_chunk(AppendChunk {
                session_id: SessionId::parse("oversized").unwrap(),
                index: 0,
                data: Bytes::from_static(&[7u8; 40]),
                declared_name: "a.pdf".to_string(),
                total_size: 10,
                client_addr: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));
        assert_eq!(assembler.session_count().await, 0);
    }
}
