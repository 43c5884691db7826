//! Audit sink that counts events before forwarding them.

use crate::metrics;
use hopper_assembler::{AuditAction, AuditEvent, AuditOutcome, AuditSink};

/// Wraps another [`AuditSink`], counting every event in
/// `hopper_audit_events_total` and each session state transition in its
/// lifecycle counter.
pub struct MetricsAuditSink<S> {
    inner: S,
}

impl<S: AuditSink> MetricsAuditSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: AuditSink> AuditSink for MetricsAuditSink<S> {
    fn record(&self, event: AuditEvent) {
        let outcome = match event.outcome {
            AuditOutcome::Ok => "ok",
            AuditOutcome::Failed { .. } => "failed",
        };
        metrics::AUDIT_EVENTS
            .with_label_values(&[event.action.as_str(), outcome])
            .inc();
        // Replayed finalize outcomes change no state and are not counted.
        match (&event.action, &event.outcome, event.replayed) {
            (AuditAction::Opened, _, _) => metrics::UPLOAD_SESSIONS_OPENED.inc(),
            (AuditAction::Finalized, AuditOutcome::Ok, false) => {
                metrics::UPLOADS_FINALIZED.inc()
            }
            (AuditAction::Rejected, _, false) => metrics::UPLOADS_REJECTED.inc(),
            (AuditAction::Expired, _, _) => metrics::UPLOAD_SESSIONS_EXPIRED.inc(),
            (AuditAction::Aborted, _, _) => metrics::UPLOAD_SESSIONS_ABORTED.inc(),
            _ => {}
        }

        self.inner.record(event);
    }
}
