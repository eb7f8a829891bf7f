pub mod change_log;
pub mod config;
pub mod conflict;
pub mod dialect;
pub mod error;
pub mod normalize;
pub mod notify;
pub mod registry;
pub mod replicator;
pub mod resolution;
pub mod row;
pub mod schema;
pub mod worker;

pub use change_log::ChangeLogRow;
pub use config::{Config, SyncMode};
pub use conflict::Conflict;
pub use dialect::{BackendTag, Dialect, ALL_TAGS};
pub use error::{ReplicationError, Result};
pub use notify::{LoggingNotifier, Notifier};
pub use registry::BackendRegistry;
pub use replicator::{apply_change, ApplyOutcome};
pub use resolution::{migrate_database, migrate_table, resolve_with_backend, resolve_with_custom, Winner};
pub use row::RowData;
pub use worker::Worker;
