//! Backend Registry: one lazily-created, process-wide
//! connection pool per backend tag, plus the control-backend tag.

use crate::config::Config;
use crate::dialect::{BackendTag, ALL_TAGS};
use crate::error::ReplicationError;
use crate::schema::{BACKEND_SCHEMA, CONTROL_SCHEMA};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;

pub type SqlitePool = Pool<SqliteConnectionManager>;

pub struct BackendRegistry {
    config: Config,
    pools: Mutex<HashMap<BackendTag, SqlitePool>>,
}

impl BackendRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The fixed three backend tags, in canonical order.
    pub fn all_tags(&self) -> [BackendTag; 3] {
        ALL_TAGS
    }

    /// The backend designated to hold `conflicts` and user accounts.
    pub fn control_tag(&self) -> BackendTag {
        self.config.control_db
    }

    /// Get (creating and warming on first access) the pool for `tag`.
    /// Safe for concurrent first access: the map insert is guarded by
    /// a mutex, so two callers racing to warm the same tag never
    /// build two pools.
    pub fn engine(&self, tag: BackendTag) -> Result<SqlitePool, ReplicationError> {
        let mut pools = self.pools.lock().expect("backend registry mutex poisoned");
        if let Some(pool) = pools.get(&tag) {
            return Ok(pool.clone());
        }

        let path = self.config.backend_path(tag);
        let manager = SqliteConnectionManager::file(&path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| ReplicationError::Config(format!("failed to open pool for {tag}: {e}")))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(BACKEND_SCHEMA)?;
            if tag == self.control_tag() {
                conn.execute_batch(CONTROL_SCHEMA)?;
            }
        }

        log::info!("backend {tag} pool warmed at {path}");
        pools.insert(tag, pool.clone());
        Ok(pool)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
