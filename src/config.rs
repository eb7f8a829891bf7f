//! Typed configuration, loaded from the environment the way
//! the original `backend/app/config.py` loads from `os.getenv`, with
//! an optional `.env` file read via `dotenvy`.

use crate::dialect::BackendTag;
use crate::error::ReplicationError;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Realtime,
    Schedule,
    Hybrid,
}

impl SyncMode {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => SyncMode::Realtime,
            "schedule" => SyncMode::Schedule,
            // invalid or anything else falls back to hybrid
            "hybrid" => SyncMode::Hybrid,
            _ => SyncMode::Hybrid,
        }
    }

    pub fn realtime_enabled(self) -> bool {
        matches!(self, SyncMode::Realtime | SyncMode::Hybrid)
    }

    pub fn schedule_enabled(self) -> bool {
        matches!(self, SyncMode::Schedule | SyncMode::Hybrid)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub control_db: BackendTag,
    backend_paths: HashMap<BackendTag, String>,
    pub sync_poll_seconds: u64,
    pub sync_batch_size: u32,
    pub sync_mode: SyncMode,
    pub sync_schedule_interval_seconds: u64,
    pub sync_schedule_max_rounds: u32,
    pub admin_registration_code: String,
}

impl Config {
    /// Load configuration from the process environment, optionally
    /// preceded by a `.env` file if one is present. Fatal (`ConfigError`)
    /// on malformed values.
    pub fn from_env() -> Result<Self, ReplicationError> {
        let _ = dotenvy::dotenv();

        let control_db = BackendTag::parse(&env_or("CONTROL_DB", "A"))?;

        let mut backend_paths = HashMap::new();
        for tag in crate::dialect::ALL_TAGS {
            let key = format!("BACKEND_{}_PATH", tag.as_str());
            let default = format!("./data/backend_{}.sqlite3", tag.as_str().to_ascii_lowercase());
            backend_paths.insert(tag, env_or(&key, &default));
        }

        let sync_poll_seconds = parse_u64(&env_or("SYNC_POLL_SECONDS", "2"), "SYNC_POLL_SECONDS")?.max(1);
        let sync_batch_size = parse_u32(&env_or("SYNC_BATCH_SIZE", "100"), "SYNC_BATCH_SIZE")?;
        let sync_mode = SyncMode::parse(&env_or("SYNC_MODE", "hybrid"));
        let sync_schedule_interval_seconds = parse_u64(
            &env_or("SYNC_SCHEDULE_INTERVAL_SECONDS", "300"),
            "SYNC_SCHEDULE_INTERVAL_SECONDS",
        )?
        .max(1);
        let sync_schedule_max_rounds =
            parse_u32(&env_or("SYNC_SCHEDULE_MAX_ROUNDS", "5"), "SYNC_SCHEDULE_MAX_ROUNDS")?.max(1);
        let admin_registration_code = env_or("ADMIN_REGISTRATION_CODE", "aaa");

        Ok(Self {
            control_db,
            backend_paths,
            sync_poll_seconds,
            sync_batch_size,
            sync_mode,
            sync_schedule_interval_seconds,
            sync_schedule_max_rounds,
            admin_registration_code,
        })
    }

    pub fn backend_path(&self, tag: BackendTag) -> String {
        self.backend_paths
            .get(&tag)
            .cloned()
            .unwrap_or_else(|| format!("./data/backend_{}.sqlite3", tag.as_str().to_ascii_lowercase()))
    }

    /// Build a configuration for tests: each backend tag gets its own
    /// throwaway SQLite file under the system temp directory, so a
    /// pool can open multiple connections to the same "backend"
    /// without the connections disagreeing about their data (an
    /// in-process `:memory:` database is private per-connection,
    /// which would defeat the pool).
    ///
    /// Not `#[cfg(test)]`-gated: the integration suite under `tests/`
    /// links against this crate as an ordinary dependency and needs
    /// this constructor too.
    pub fn for_tests() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let run_id = format!(
            "{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let mut backend_paths = HashMap::new();
        for tag in crate::dialect::ALL_TAGS {
            let path = std::env::temp_dir().join(format!("replication_fabric_{run_id}_{}.sqlite3", tag.as_str()));
            backend_paths.insert(tag, path.to_string_lossy().into_owned());
        }
        Self {
            control_db: BackendTag::A,
            backend_paths,
            sync_poll_seconds: 1,
            sync_batch_size: 100,
            sync_mode: SyncMode::Hybrid,
            sync_schedule_interval_seconds: 1,
            sync_schedule_max_rounds: 5,
            admin_registration_code: "aaa".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(s: &str, key: &str) -> Result<u64, ReplicationError> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| ReplicationError::Config(format!("{key} must be a positive integer, got {s:?}")))
}

fn parse_u32(s: &str, key: &str) -> Result<u32, ReplicationError> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| ReplicationError::Config(format!("{key} must be a positive integer, got {s:?}")))
}
