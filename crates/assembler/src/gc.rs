//! Idle-session garbage collection.

use crate::assembler::{SharedEntry, UploadAssembler};
use crate::audit::{AuditAction, AuditEvent, AuditOutcome};
use crate::error::UploadResult;
use hopper_core::{SessionId, UploadState};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Counters from one sweep or orphan purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Open sessions discarded for inactivity.
    pub expired: u64,
    /// Completed or rejected records dropped after their retention period.
    pub retired: u64,
    /// Staging artifacts that belonged to no tracked session.
    pub orphans_removed: u64,
    pub bytes_reclaimed: u64,
    pub errors: u64,
}

impl UploadAssembler {
    /// Sweep at the current time.
    pub async fn sweep_idle_sessions(&self) -> SweepStats {
        self.sweep_idle_sessions_at(OffsetDateTime::now_utc()).await
    }

    /// Discard open sessions idle past `gc.idle_timeout` and drop terminal
    /// records older than `gc.terminal_retention`, as of `now`.
    ///
    /// Sessions that are busy (locked by an append or finalize) are skipped.
    /// `Finalizing` sessions are never collected.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_idle_sessions_at(&self, now: OffsetDateTime) -> SweepStats {
        let entries: Vec<(SessionId, SharedEntry)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };

        let idle_timeout = self.gc.idle_timeout();
        let retention = self.gc.terminal_retention();
        let mut stats = SweepStats::default();

        for (id, entry) in entries {
            let Ok(mut guard) = entry.clone().try_lock_owned() else {
                continue;
            };
            if guard.discarded {
                continue;
            }

            match guard.session.state {
                UploadState::Open if guard.session.is_idle(now, idle_timeout) => {
                    if let Err(e) = self.store.remove_staged(guard.session.staging_key()).await {
                        // Left registered so the next sweep retries.
                        stats.errors += 1;
                        tracing::warn!(
                            session_id = %id,
                            error = %e,
                            "Failed to remove staging artifact of idle session"
                        );
                        continue;
                    }
                    guard.discarded = true;
                    self.forget(&id, &entry).await;

                    stats.expired += 1;
                    stats.bytes_reclaimed += guard.session.bytes_written;
                    tracing::info!(
                        session_id = %id,
                        received = guard.session.received.len(),
                        expected = guard.session.expected_chunk_count(),
                        "Idle upload session expired"
                    );
                    self.audit.record(AuditEvent::new(
                        id,
                        guard.session.client_addr,
                        AuditAction::Expired,
                        AuditOutcome::Ok,
                    ));
                }
                UploadState::Complete | UploadState::Rejected
                    if guard.session.is_idle(now, retention) =>
                {
                    guard.discarded = true;
                    self.forget(&id, &entry).await;
                    stats.retired += 1;
                    tracing::debug!(session_id = %id, state = %guard.session.state, "Retired terminal session record");
                }
                _ => {}
            }
        }

        if stats.expired > 0 || stats.retired > 0 || stats.errors > 0 {
            tracing::info!(
                expired = stats.expired,
                retired = stats.retired,
                bytes_reclaimed = stats.bytes_reclaimed,
                errors = stats.errors,
                "Upload session sweep finished"
            );
        }
        stats
    }

    /// Remove staging artifacts that belong to no tracked session.
    ///
    /// Sessions live in memory, so after a restart every staging artifact is
    /// an orphan. Run this before accepting uploads.
    #[tracing::instrument(skip(self))]
    pub async fn purge_orphaned_staging(&self) -> UploadResult<SweepStats> {
        let keys = self.store.list_staged().await?;
        let live: HashSet<String> = {
            let sessions = self.sessions.lock().await;
            sessions.keys().map(|id| id.as_str().to_string()).collect()
        };

        let mut stats = SweepStats::default();
        for key in keys.into_iter().filter(|key| !live.contains(key)) {
            let size = self.store.staged_size(&key).await.unwrap_or(0);
            match self.store.remove_staged(&key).await {
                Ok(true) => {
                    stats.orphans_removed += 1;
                    stats.bytes_reclaimed += size;
                }
                Ok(false) => {}
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(key = %key, error = %e, "Failed to remove orphaned staging artifact");
                }
            }
        }

        if stats.orphans_removed > 0 {
            tracing::info!(
                orphans_removed = stats.orphans_removed,
                bytes_reclaimed = stats.bytes_reclaimed,
                "Purged orphaned staging artifacts"
            );
        }
        Ok(stats)
    }

    /// Run [`sweep_idle_sessions`](Self::sweep_idle_sessions) every
    /// `gc.sweep_interval`.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        // tokio::time::interval panics on zero
        let interval = self.gc.sweep_interval().max(std::time::Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.sweep_idle_sessions().await;
            }
        })
    }
}
