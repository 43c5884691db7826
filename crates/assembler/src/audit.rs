//! Audit events emitted by the assembler.
//!
//! The assembler does not own log storage. It hands one [`AuditEvent`] per
//! append and one per finalize or rejection to an injected [`AuditSink`],
//! plus one when a session is opened, aborted or expired.

use hopper_core::SessionId;
use serde::Serialize;
use std::net::IpAddr;
use time::OffsetDateTime;

/// What happened to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    Opened,
    ChunkAppended { index: u32 },
    Finalized,
    Rejected,
    Expired,
    Aborted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Opened => "opened",
            AuditAction::ChunkAppended { .. } => "chunk_appended",
            AuditAction::Finalized => "finalized",
            AuditAction::Rejected => "rejected",
            AuditAction::Expired => "expired",
            AuditAction::Aborted => "aborted",
        }
    }
}

/// Whether the action succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    Ok,
    Failed { code: &'static str },
}

impl AuditOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, AuditOutcome::Ok)
    }
}

/// One structured audit record.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub session_id: SessionId,
    pub client_addr: Option<IpAddr>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    /// A repeated finalize that returned the session's earlier outcome
    /// without changing its state.
    pub replayed: bool,
}

impl AuditEvent {
    pub fn new(
        session_id: SessionId,
        client_addr: Option<IpAddr>,
        action: AuditAction,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            at: OffsetDateTime::now_utc(),
            session_id,
            client_addr,
            action,
            outcome,
            replayed: false,
        }
    }

    pub fn replayed(mut self) -> Self {
        self.replayed = true;
        self
    }
}

/// Destination for audit events.
///
/// `record` runs on the caller's task and is synchronous. Open events are
/// recorded while the session registry is locked, abort and expiry events
/// while the session's own lock is held, so implementations must not block.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` events on the `hopper::audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let client_addr = event
            .client_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        let index = match event.action {
            AuditAction::ChunkAppended { index } => Some(index),
            _ => None,
        };
        match event.outcome {
            AuditOutcome::Ok => tracing::info!(
                target: "hopper::audit",
                at = %event.at,
                session_id = %event.session_id,
                client_addr = %client_addr,
                action = event.action.as_str(),
                index = ?index,
                outcome = "ok",
                replayed = event.replayed,
            ),
            AuditOutcome::Failed { code } => tracing::warn!(
                target: "hopper::audit",
                at = %event.at,
                session_id = %event.session_id,
                client_addr = %client_addr,
                action = event.action.as_str(),
                index = ?index,
                outcome = "failed",
                code = code,
                replayed = event.replayed,
            ),
        }
    }
}
