//! Notifier boundary: the narrow trait the
//! Replicator and Resolution Engine call through in place of the
//! external emailer, which is out of scope for this core. Calls are
//! always best-effort. The trait has no fallible path, so a broken
//! implementation can never block apply or resolution.

use crate::dialect::BackendTag;

pub trait Notifier: Send + Sync {
    fn notify_conflict(&self, conflict_id: i64, table: &str, pk: &str, source_db: BackendTag, target_db: BackendTag);
    fn notify_resolved(&self, conflict_id: i64, winner: &str);
}

/// Default implementation: logs at `warn`/`info` instead of sending
/// mail. A real deployment supplies its own `Notifier` (the admin
/// surface's emailer) wired in at construction time.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify_conflict(&self, conflict_id: i64, table: &str, pk: &str, source_db: BackendTag, target_db: BackendTag) {
        log::warn!(
            "conflict #{conflict_id} on {table}:{pk} ({source_db} vs {target_db}), admin notification requested"
        );
    }

    fn notify_resolved(&self, conflict_id: i64, winner: &str) {
        log::info!("conflict #{conflict_id} resolved, winner={winner}, resolved notification requested");
    }
}
