use crate::error::ReplicationError;
use std::fmt;

/// Short uppercase tag naming one of the three replicated backends.
///
/// Kept as a closed enum rather than a free string: an unknown tag is
/// only reachable through config parsing, where it becomes a
/// `ReplicationError::Config` at startup rather than a runtime branch
/// every caller has to guard against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendTag {
    A,
    B,
    C,
}

/// Canonical, fixed iteration order for `BackendRegistry::all_tags`.
pub const ALL_TAGS: [BackendTag; 3] = [BackendTag::A, BackendTag::B, BackendTag::C];

impl BackendTag {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendTag::A => "A",
            BackendTag::B => "B",
            BackendTag::C => "C",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ReplicationError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(BackendTag::A),
            "B" => Ok(BackendTag::B),
            "C" => Ok(BackendTag::C),
            other => Err(ReplicationError::Config(format!(
                "unknown backend tag: {other}"
            ))),
        }
    }

    /// The dialect quirks this backend emulates. `A` and `B` share the
    /// `LIMIT` row-limiting form; `C` stands in for the dialect whose
    /// driver rejects a parameterized row count and instead takes a
    /// literal-embedded `TOP (n)`.
    pub fn dialect(self) -> Dialect {
        match self {
            BackendTag::A | BackendTag::B => Dialect::Standard,
            BackendTag::C => Dialect::TopEmbedded,
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect-specific behavior: the full
/// set of SQL-text and type quirks this core has to paper over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Trailing `LIMIT :n`, native boolean columns accepted as-is.
    Standard,
    /// Leading `TOP (n)` with the row count embedded as a literal
    /// (this dialect's driver rejects a parameterized row count).
    /// Boolean columns are `SMALLINT` in the dialect this stands in
    /// for; `normalize` coerces bool-to-integer unconditionally for
    /// every row regardless of target dialect, so no branch is needed
    /// here.
    TopEmbedded,
}

const CHANGE_LOG_COLUMNS: &str =
    "change_id, table_name, pk_value, op_type, row_data, source_db, processed, processed_at, created_at";

impl Dialect {
    /// Build the `SELECT ... FROM change_log WHERE processed = 0
    /// ORDER BY change_id` query bounded to `batch_size` rows, in
    /// this dialect's row-limiting idiom.
    ///
    /// `Standard` binds the row count as parameter `?1` (the
    /// `LIMIT :n` form). `TopEmbedded` stands in for the dialect whose
    /// driver rejects a parameterized row count: the limit is embedded
    /// as a literal in the query text instead of bound. `batch_size`
    /// is caller-controlled configuration, never user input, so the
    /// literal embedding carries no injection risk.
    ///
    /// All three backend tags share SQLite as the underlying storage
    /// engine in this port, so both branches
    /// emit `LIMIT` rather than a real `TOP` keyword. The
    /// distinguishing trait this shim preserves is *parameterized vs.
    /// literal-embedded*, not the keyword spelling.
    pub fn select_unprocessed_sql(self, batch_size: u32) -> String {
        match self {
            Dialect::Standard => format!(
                "SELECT {CHANGE_LOG_COLUMNS} FROM change_log WHERE processed = 0 ORDER BY change_id ASC LIMIT ?1"
            ),
            Dialect::TopEmbedded => format!(
                "SELECT {CHANGE_LOG_COLUMNS} FROM change_log WHERE processed = 0 ORDER BY change_id ASC LIMIT {}",
                batch_size
            ),
        }
    }

    /// Whether this dialect's row-limiting clause takes a bound
    /// parameter (`Standard`) or already has the count embedded
    /// (`TopEmbedded`).
    pub fn binds_limit_param(self) -> bool {
        matches!(self, Dialect::Standard)
    }
}
