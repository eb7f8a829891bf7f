//! Replicator, the heart of the system. Applies one
//! change event from `source_tag` to every other backend, detecting
//! conflicts and recording them in the control store.

use crate::change_log::ChangeLogRow;
use crate::conflict;
use crate::dialect::BackendTag;
use crate::error::ReplicationError;
use crate::normalize::normalize;
use crate::notify::Notifier;
use crate::registry::BackendRegistry;
use crate::row::{decode_row, row_version, to_sql_value, updated_by_db, RowData};
use crate::schema::table_metadata;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The row was inserted or updated on at least one target.
    Applied,
    /// Unknown table, or nothing to do (e.g. a `D` op, which this
    /// core recognizes but never applies).
    Skipped,
    /// A conflict was detected and recorded on at least one target;
    /// `conflict_id` is the last one raised.
    Conflict(i64),
}

/// Apply one change event from `source_tag` to every other backend.
///
/// Any exception during a single target's apply bubbles up to the
/// caller (the worker loop), which leaves the change unprocessed for
/// retry. This function does not catch its own per-target errors.
pub fn apply_change(
    registry: &BackendRegistry,
    notifier: &dyn Notifier,
    source_tag: BackendTag,
    change: &ChangeLogRow,
) -> Result<ApplyOutcome, ReplicationError> {
    let (columns, pk_col) = match table_metadata(&change.table_name) {
        Ok(meta) => meta,
        Err(_) => return Ok(ApplyOutcome::Skipped),
    };

    let mut incoming = decode_row(&change.row_data)?;
    let incoming_ver = row_version(&incoming);

    normalize(&mut incoming);
    incoming.insert(pk_col.to_string(), Value::String(change.pk_value.clone()));
    // Stamping the source tag (not the target) is what prevents echo
    // loops: a target-side trigger that sees a write stamped with a
    // foreign tag attributes the next emission back to that source,
    // whose own detection logic then harmlessly no-ops on the echo.
    incoming.insert(
        "updated_by_db".to_string(),
        Value::String(source_tag.as_str().to_string()),
    );

    let op = change.op_type.as_str();
    let mut outcome = ApplyOutcome::Skipped;

    for target_tag in registry.all_tags().into_iter().filter(|t| *t != source_tag) {
        let target_pool = registry.engine(target_tag)?;
        let mut target_conn = target_pool.get()?;
        let target_tx = target_conn.transaction()?;

        let existing = select_row(&target_tx, &change.table_name, pk_col, &change.pk_value, columns)?;

        match existing {
            None => {
                if op == "I" || op == "U" {
                    insert_row(&target_tx, &change.table_name, columns, &incoming)?;
                    outcome = ApplyOutcome::Applied;
                }
                target_tx.commit()?;
            }
            Some(existing_row) => {
                let target_ver = row_version(&existing_row);
                let target_stamp = updated_by_db(&existing_row);

                // Conflict test: the
                // target moved strictly ahead of the incoming version
                // under a different writer. Equal versions favor the
                // incoming row (source-assisted convergence).
                if target_ver > incoming_ver && target_stamp != source_tag.as_str() {
                    target_tx.commit()?;

                    let control_pool = registry.engine(registry.control_tag())?;
                    let mut control_conn = control_pool.get()?;
                    let control_tx = control_conn.transaction()?;
                    let conflict_id = conflict::record_conflict(
                        &control_tx,
                        &change.table_name,
                        &change.pk_value,
                        source_tag,
                        target_tag,
                        &incoming,
                        &existing_row,
                    )?;
                    control_tx.commit()?;

                    notifier.notify_conflict(conflict_id, &change.table_name, &change.pk_value, source_tag, target_tag);
                    outcome = ApplyOutcome::Conflict(conflict_id);
                    continue;
                }

                if op == "I" || op == "U" {
                    update_row(&target_tx, &change.table_name, columns, pk_col, &incoming)?;
                    if !matches!(outcome, ApplyOutcome::Conflict(_)) {
                        outcome = ApplyOutcome::Applied;
                    }
                }
                // op == "D": recognized but not applied.
                target_tx.commit()?;
            }
        }
    }

    Ok(outcome)
}

pub(crate) fn select_row(
    conn: &Connection,
    table: &str,
    pk_col: &str,
    pk: &str,
    columns: &[&str],
) -> Result<Option<RowData>, ReplicationError> {
    let collist = columns.join(", ");
    let sql = format!("SELECT {collist} FROM {table} WHERE {pk_col} = ?1");
    let row = conn
        .query_row(&sql, [pk], |r| {
            let mut map = RowData::new();
            for (i, col) in columns.iter().enumerate() {
                let v: rusqlite::types::Value = r.get(i)?;
                map.insert((*col).to_string(), crate::row::from_sql_value(v));
            }
            Ok(map)
        })
        .optional()?;
    Ok(row)
}

pub(crate) fn insert_row(conn: &Connection, table: &str, columns: &[&str], row: &RowData) -> Result<(), ReplicationError> {
    let collist = columns.join(", ");
    let placeholders = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
    let sql = format!("INSERT INTO {table} ({collist}) VALUES ({placeholders})");
    let values = columns
        .iter()
        .map(|c| row.get(*c).map(to_sql_value).unwrap_or(rusqlite::types::Value::Null))
        .collect::<Vec<_>>();
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Update every non-pk column from `row`.
pub(crate) fn update_row(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    pk_col: &str,
    row: &RowData,
) -> Result<(), ReplicationError> {
    let set_cols: Vec<&&str> = columns.iter().filter(|c| **c != pk_col).collect();
    let sets = set_cols
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {table} SET {sets} WHERE {pk_col} = ?{}", set_cols.len() + 1);

    let mut values = set_cols
        .iter()
        .map(|c| row.get(**c).map(to_sql_value).unwrap_or(rusqlite::types::Value::Null))
        .collect::<Vec<_>>();
    values.push(to_sql_value(
        row.get(pk_col).ok_or_else(|| ReplicationError::SchemaMismatch(format!("missing pk column {pk_col}")))?,
    ));

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}
