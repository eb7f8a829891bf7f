use thiserror::Error;

/// Error taxonomy for the replication fabric.
///
/// `ConflictDetected` is deliberately absent: a detected conflict is
/// normal control flow (`ApplyOutcome::Conflict`), not a failure.
/// Notifier failures never surface here either. `Notifier` methods
/// do not return `Result`, so a broken notifier can never block apply
/// or resolution.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Unknown backend tag, malformed connection parameters: fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Connection failure, deadlock, dialect mismatch: logged by the
    /// caller; the offending change is left unprocessed for retry.
    #[error("transient database error: {0}")]
    TransientDb(#[from] rusqlite::Error),

    /// Pool checkout failure, equivalent in severity to a transient DB error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Unknown table or missing pk column: treated as skip, never
    /// allowed to halt replication for other rows.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Resolving an already-resolved conflict, resolving with a
    /// missing pk, or an invalid table: surfaced to the admin caller
    /// verbatim.
    #[error("invalid admin input: {0}")]
    AdminInput(String),
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
