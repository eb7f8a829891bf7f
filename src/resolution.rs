//! Resolution Engine: admin-gated arbitration that
//! re-broadcasts a winning row to every backend and closes the
//! conflict. Also backs the manual migration operations, which reuse
//! the same upsert path.

use crate::conflict;
use crate::dialect::BackendTag;
use crate::error::ReplicationError;
use crate::normalize::normalize;
use crate::notify::Notifier;
use crate::registry::BackendRegistry;
use crate::row::{decode_row, row_version, RowData};
use crate::schema::{table_metadata, SYNC_TABLES};
use serde_json::Value;

/// Which side of a conflict the admin picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Source,
    Target,
}

/// Resolve a conflict by choosing the source or target snapshot
/// outright.
pub fn resolve_with_backend(
    registry: &BackendRegistry,
    notifier: &dyn Notifier,
    conflict_id: i64,
    winner: Winner,
    admin_identity: &str,
) -> Result<(), ReplicationError> {
    let control_pool = registry.engine(registry.control_tag())?;
    let record = conflict::get(&control_pool, conflict_id)?
        .ok_or_else(|| ReplicationError::AdminInput(format!("no such conflict: {conflict_id}")))?;
    if record.status == "RESOLVED" {
        return Err(ReplicationError::AdminInput(format!(
            "conflict {conflict_id} is already resolved"
        )));
    }

    let (_, pk_col) = table_metadata(&record.table_name)?;

    let chosen_raw = match winner {
        Winner::Source => &record.source_row_data,
        Winner::Target => &record.target_row_data,
    };
    let winner_tag = match winner {
        Winner::Source => record.source_db.as_str(),
        Winner::Target => record.target_db.as_str(),
    };

    let mut chosen = decode_row(&serde_json::from_str::<Value>(chosen_raw)?)?;
    chosen.insert(pk_col.to_string(), Value::String(record.pk_value.clone()));
    chosen.insert("updated_by_db".to_string(), Value::String(winner_tag.to_ascii_uppercase()));
    normalize(&mut chosen);

    upsert_everywhere(registry, &record.table_name, &chosen)?;

    conflict::mark_resolved(&control_pool, conflict_id, &winner_tag.to_ascii_uppercase(), admin_identity)?;
    notifier.notify_resolved(conflict_id, &winner_tag.to_ascii_uppercase());
    Ok(())
}

/// Resolve a conflict with an administrator-authored row. Starts from
/// the source snapshot, overlays field overrides (nulls ignored, only
/// declared columns accepted), and requires the pk to survive the
/// overlay.
pub fn resolve_with_custom(
    registry: &BackendRegistry,
    notifier: &dyn Notifier,
    conflict_id: i64,
    overrides: &RowData,
    admin_identity: &str,
) -> Result<(), ReplicationError> {
    let control_pool = registry.engine(registry.control_tag())?;
    let record = conflict::get(&control_pool, conflict_id)?
        .ok_or_else(|| ReplicationError::AdminInput(format!("no such conflict: {conflict_id}")))?;
    if record.status == "RESOLVED" {
        return Err(ReplicationError::AdminInput(format!(
            "conflict {conflict_id} is already resolved"
        )));
    }

    let (columns, pk_col) = table_metadata(&record.table_name)?;

    let mut custom = decode_row(&serde_json::from_str::<Value>(&record.source_row_data)?)?;
    for (key, value) in overrides.iter() {
        if value.is_null() {
            continue;
        }
        if columns.contains(&key.as_str()) {
            custom.insert(key.clone(), value.clone());
        }
    }

    // Only presence is required, not equality with the conflicted pk: an
    // admin-supplied pk override (corrected or differently cased) is a
    // legitimate upsert target, not an error.
    if custom.get(pk_col).and_then(Value::as_str).filter(|s| !s.is_empty()).is_none() {
        custom.insert(pk_col.to_string(), Value::String(record.pk_value.clone()));
    }

    let stamp: String = admin_identity.chars().take(16).collect::<String>().to_ascii_uppercase();
    custom.insert("updated_by_db".to_string(), Value::String(stamp));

    let version = row_version(&custom).max(1);
    custom.insert("row_version".to_string(), Value::Number(version.into()));

    normalize(&mut custom);

    upsert_everywhere(registry, &record.table_name, &custom)?;

    conflict::mark_resolved(&control_pool, conflict_id, "CUSTOM", admin_identity)?;
    notifier.notify_resolved(conflict_id, "CUSTOM");
    Ok(())
}

/// Write `row` to every backend, select-then-insert-or-update,
/// regardless of what each backend currently holds. Used by both
/// resolution modes and by the manual migration helpers below.
fn upsert_everywhere(registry: &BackendRegistry, table: &str, row: &RowData) -> Result<(), ReplicationError> {
    let (columns, pk_col) = table_metadata(table)?;
    let pk = row
        .get(pk_col)
        .and_then(Value::as_str)
        .ok_or_else(|| ReplicationError::AdminInput(format!("row is missing primary key column {pk_col}")))?
        .to_string();

    for tag in registry.all_tags() {
        let pool = registry.engine(tag)?;
        let mut conn = pool.get()?;
        let tx = conn.transaction()?;
        let existing = crate::replicator::select_row(&tx, table, pk_col, &pk, columns)?;
        if existing.is_some() {
            crate::replicator::update_row(&tx, table, columns, pk_col, row)?;
        } else {
            crate::replicator::insert_row(&tx, table, columns, row)?;
        }
        tx.commit()?;
    }
    Ok(())
}

/// `table_metadata`, but for callers where `table` is raw admin input
/// rather than a value already validated when a conflict was recorded:
/// an unknown table is an invalid admin request, not a schema mismatch
/// surfaced mid-replication.
fn admin_table_metadata(table: &str) -> Result<(&'static [&'static str], &'static str), ReplicationError> {
    table_metadata(table).map_err(|err| match err {
        ReplicationError::SchemaMismatch(msg) => ReplicationError::AdminInput(msg),
        other => other,
    })
}

/// Manual, admin-gated migration of a single table from `source` to
/// every tag in `targets`, stamping `updated_by_db := source`. Reuses
/// the same upsert path as resolution.
pub fn migrate_table(
    registry: &BackendRegistry,
    table: &str,
    source: BackendTag,
    targets: &[BackendTag],
) -> Result<usize, ReplicationError> {
    let (columns, pk_col) = admin_table_metadata(table)?;
    let source_pool = registry.engine(source)?;
    let source_conn = source_pool.get()?;

    let collist = columns.join(", ");
    let sql = format!("SELECT {collist} FROM {table}");
    let mut stmt = source_conn.prepare(&sql)?;
    let rows: Vec<RowData> = stmt
        .query_map([], |r| {
            let mut map = RowData::new();
            for (i, col) in columns.iter().enumerate() {
                let v: rusqlite::types::Value = r.get(i)?;
                map.insert((*col).to_string(), crate::row::from_sql_value(v));
            }
            Ok(map)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    drop(source_conn);

    let mut migrated = 0;
    for mut row in rows {
        row.insert("updated_by_db".to_string(), Value::String(source.as_str().to_string()));
        normalize(&mut row);
        let pk = row
            .get(pk_col)
            .and_then(Value::as_str)
            .ok_or_else(|| ReplicationError::SchemaMismatch(format!("row missing pk column {pk_col}")))?
            .to_string();

        for tag in targets.iter().copied().filter(|t| *t != source) {
            let pool = registry.engine(tag)?;
            let mut conn = pool.get()?;
            let tx = conn.transaction()?;
            let existing = crate::replicator::select_row(&tx, table, pk_col, &pk, columns)?;
            if existing.is_some() {
                crate::replicator::update_row(&tx, table, columns, pk_col, &row)?;
            } else {
                crate::replicator::insert_row(&tx, table, columns, &row)?;
            }
            tx.commit()?;
        }
        migrated += 1;
    }
    Ok(migrated)
}

/// Migrate every synced table from `source` to `targets`, in FK order
/// (`users, customers, products, orders, order_items`).
pub fn migrate_database(
    registry: &BackendRegistry,
    source: BackendTag,
    targets: &[BackendTag],
) -> Result<usize, ReplicationError> {
    let mut migrated = 0;
    for table in SYNC_TABLES {
        migrated += migrate_table(registry, table, source, targets)?;
    }
    Ok(migrated)
}
