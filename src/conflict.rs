//! Conflict Store: conflict lifecycle in the control
//! backend, OPEN -> RESOLVED.

use crate::dialect::BackendTag;
use crate::error::ReplicationError;
use crate::registry::SqlitePool;
use crate::row::RowData;
use chrono::Utc;
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct Conflict {
    pub conflict_id: i64,
    pub table_name: String,
    pub pk_value: String,
    pub source_db: String,
    pub target_db: String,
    pub source_row_data: String,
    pub target_row_data: String,
    pub status: String,
    pub winner_db: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
}

/// Insert an OPEN conflict row with JSON-serialized snapshots, then
/// re-query for the newest OPEN row matching `(table, pk)` to return
/// its id, mirroring the original two-step insert-then-select.
///
/// Takes an open `Connection` (or `Transaction`, which derefs to one)
/// rather than a pool, so the caller controls the commit boundary:
/// the Replicator records a conflict inside its own dedicated
/// control-backend transaction.
pub fn record_conflict(
    conn: &rusqlite::Connection,
    table: &str,
    pk: &str,
    source_db: BackendTag,
    target_db: BackendTag,
    source_row: &RowData,
    target_row: &RowData,
) -> Result<i64, ReplicationError> {
    conn.execute(
        "INSERT INTO conflicts (table_name, pk_value, source_db, target_db, source_row_data, target_row_data, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'OPEN')",
        params![
            table,
            pk,
            source_db.as_str(),
            target_db.as_str(),
            serde_json::to_string(source_row)?,
            serde_json::to_string(target_row)?,
        ],
    )?;

    let conflict_id: i64 = conn.query_row(
        "SELECT conflict_id FROM conflicts WHERE table_name = ?1 AND pk_value = ?2 AND status = 'OPEN'
         ORDER BY conflict_id DESC LIMIT 1",
        params![table, pk],
        |r| r.get(0),
    )?;
    Ok(conflict_id)
}

/// List OPEN conflicts (the admin surface's default view).
pub fn list_open(control_pool: &SqlitePool) -> Result<Vec<Conflict>, ReplicationError> {
    let conn = control_pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT conflict_id, table_name, pk_value, source_db, target_db, source_row_data, target_row_data,
                status, winner_db, resolved_by, resolved_at
         FROM conflicts WHERE status = 'OPEN' ORDER BY conflict_id ASC",
    )?;
    let rows = stmt
        .query_map([], map_conflict)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Fetch one conflict by id, regardless of status.
pub fn get(control_pool: &SqlitePool, conflict_id: i64) -> Result<Option<Conflict>, ReplicationError> {
    let conn = control_pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT conflict_id, table_name, pk_value, source_db, target_db, source_row_data, target_row_data,
                status, winner_db, resolved_by, resolved_at
         FROM conflicts WHERE conflict_id = ?1",
    )?;
    let mut rows = stmt.query_map(params![conflict_id], map_conflict)?;
    Ok(rows.next().transpose()?)
}

/// Mark a conflict RESOLVED with the winning tag (or `"CUSTOM"`) and
/// the admin identity that made the call.
pub fn mark_resolved(
    control_pool: &SqlitePool,
    conflict_id: i64,
    winner_db: &str,
    resolved_by: &str,
) -> Result<(), ReplicationError> {
    let conn = control_pool.get()?;
    conn.execute(
        "UPDATE conflicts SET status = 'RESOLVED', winner_db = ?1, resolved_by = ?2, resolved_at = ?3
         WHERE conflict_id = ?4",
        params![winner_db, resolved_by, Utc::now().to_rfc3339(), conflict_id],
    )?;
    Ok(())
}

fn map_conflict(r: &rusqlite::Row) -> rusqlite::Result<Conflict> {
    Ok(Conflict {
        conflict_id: r.get("conflict_id")?,
        table_name: r.get("table_name")?,
        pk_value: r.get("pk_value")?,
        source_db: r.get("source_db")?,
        target_db: r.get("target_db")?,
        source_row_data: r.get("source_row_data")?,
        target_row_data: r.get("target_row_data")?,
        status: r.get("status")?,
        winner_db: r.get("winner_db")?,
        resolved_by: r.get("resolved_by")?,
        resolved_at: r.get("resolved_at")?,
    })
}
