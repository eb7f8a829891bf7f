//! Change Log Reader: ordered, bounded fetch of
//! unprocessed `change_log` rows for one backend.

use crate::dialect::BackendTag;
use crate::error::ReplicationError;
use crate::registry::SqlitePool;
use chrono::Utc;
use rusqlite::params;
use serde_json::Value;

/// One unprocessed (or, post-mark, processed) `change_log` row.
#[derive(Debug, Clone)]
pub struct ChangeLogRow {
    pub change_id: i64,
    pub table_name: String,
    pub pk_value: String,
    pub op_type: String,
    pub row_data: Value,
    pub source_db: String,
}

/// Fetch up to `batch_size` unprocessed rows from `tag`'s
/// `change_log`, ascending by `change_id`. Commits (releases the
/// connection) immediately after the `SELECT` to keep locks short.
/// On failure, logs and returns an empty batch so the caller retries
/// next tick. This reader never propagates an error.
pub fn fetch_unprocessed(pool: &SqlitePool, tag: BackendTag, batch_size: u32) -> Vec<ChangeLogRow> {
    match fetch_unprocessed_inner(pool, tag, batch_size) {
        Ok(rows) => rows,
        Err(err) => {
            log::warn!("change log fetch failed for backend {tag}: {err}");
            Vec::new()
        }
    }
}

fn fetch_unprocessed_inner(
    pool: &SqlitePool,
    tag: BackendTag,
    batch_size: u32,
) -> Result<Vec<ChangeLogRow>, ReplicationError> {
    let conn = pool.get()?;

    let dialect = tag.dialect();
    let sql = dialect.select_unprocessed_sql(batch_size);
    let mut stmt = conn.prepare(&sql)?;

    let map_row = |r: &rusqlite::Row| -> rusqlite::Result<ChangeLogRow> {
        let row_data_raw: String = r.get("row_data")?;
        let row_data = serde_json::from_str(&row_data_raw).unwrap_or(Value::Null);
        Ok(ChangeLogRow {
            change_id: r.get("change_id")?,
            table_name: r.get("table_name")?,
            pk_value: r.get("pk_value")?,
            op_type: r.get("op_type")?,
            row_data,
            source_db: r.get("source_db")?,
        })
    };

    let rows = if dialect.binds_limit_param() {
        stmt.query_map(params![batch_size], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt.query_map([], map_row)?.collect::<rusqlite::Result<Vec<_>>>()?
    };

    Ok(rows)
}

/// Mark a single change as processed, stamping `processed_at`.
pub fn mark_processed(pool: &SqlitePool, change_id: i64) -> Result<(), ReplicationError> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE change_log SET processed = 1, processed_at = ?1 WHERE change_id = ?2",
        params![Utc::now().to_rfc3339(), change_id],
    )?;
    Ok(())
}

/// Insert a new `change_log` row, standing in for the external
/// trigger layer in tests and migration helpers.
pub fn append(
    pool: &SqlitePool,
    table_name: &str,
    pk_value: &str,
    op_type: &str,
    row_data: &Value,
    source_db: BackendTag,
) -> Result<i64, ReplicationError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO change_log (table_name, pk_value, op_type, row_data, source_db, processed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            table_name,
            pk_value,
            op_type,
            row_data.to_string(),
            source_db.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::BackendRegistry;
    use serde_json::json;

    #[test]
    fn fetch_respects_batch_size_and_order() {
        let registry = BackendRegistry::new(Config::for_tests());
        let pool = registry.engine(BackendTag::B).unwrap();

        for i in 0..5 {
            append(
                &pool,
                "products",
                &format!("P{i}"),
                "I",
                &json!({"product_id": format!("P{i}")}),
                BackendTag::B,
            )
            .unwrap();
        }

        let batch = fetch_unprocessed(&pool, BackendTag::B, 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].pk_value, "P0");
        assert_eq!(batch[2].pk_value, "P2");
    }

    #[test]
    fn mark_processed_excludes_row_from_next_fetch() {
        let registry = BackendRegistry::new(Config::for_tests());
        let pool = registry.engine(BackendTag::C).unwrap();

        let id = append(
            &pool,
            "products",
            "P1",
            "I",
            &json!({"product_id": "P1"}),
            BackendTag::C,
        )
        .unwrap();

        mark_processed(&pool, id).unwrap();
        let batch = fetch_unprocessed(&pool, BackendTag::C, 10);
        assert!(batch.is_empty());
    }
}
