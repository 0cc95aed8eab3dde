//! Explicit callback ports (spec.md §9 "Signals/callbacks -> explicit ports")

use crate::types::AuditEntry;
use std::sync::Arc;

/// Invoked from the calling (worker) thread as a long pipeline stage
/// progresses. Callers must be thread-safe or marshal as needed.
pub type ProgressSink = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Mirrors every audit entry the pipeline or conflict engine appends, for
/// external audit consumers. Independent of the storage-backed audit log.
pub type AuditSink = Arc<dyn Fn(&AuditEntry) + Send + Sync>;

/// A no-op progress sink, useful as a default for callers that don't care.
pub fn silent_progress() -> ProgressSink {
    Arc::new(|_stage, _current, _total| {})
}

/// A no-op audit sink.
pub fn silent_audit() -> AuditSink {
    Arc::new(|_entry| {})
}
