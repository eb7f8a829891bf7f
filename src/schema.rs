//! Single source of truth for the shape of the synchronized tables,
//! mirroring `TABLE_COLUMNS` / `TABLE_PK` / `SYNC_TABLES` from the
//! original replicator.

use crate::error::ReplicationError;

/// The five tables replicated across all backends, in FK-respecting
/// order (also the order `migrate_database` walks them in).
pub const SYNC_TABLES: &[&str] = &["users", "customers", "products", "orders", "order_items"];

/// Full column list per table, schema order, including replication
/// metadata columns. Used to build `INSERT`/`UPDATE` statements.
pub fn table_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "users" => Some(&[
            "user_id",
            "username",
            "password_hash",
            "role",
            "created_at",
            "updated_at",
            "updated_by_db",
            "row_version",
        ]),
        "customers" => Some(&[
            "customer_id",
            "customer_name",
            "email",
            "phone",
            "created_at",
            "updated_at",
            "updated_by_db",
            "row_version",
        ]),
        "products" => Some(&[
            "product_id",
            "product_name",
            "price",
            "stock",
            "created_at",
            "updated_at",
            "updated_by_db",
            "row_version",
        ]),
        "orders" => Some(&[
            "order_id",
            "customer_id",
            "order_date",
            "total_amount",
            "status",
            "created_at",
            "updated_at",
            "updated_by_db",
            "row_version",
        ]),
        "order_items" => Some(&[
            "item_id",
            "order_id",
            "product_id",
            "quantity",
            "price",
            "created_at",
            "updated_at",
            "updated_by_db",
            "row_version",
        ]),
        _ => None,
    }
}

/// The single-column string primary key for each synchronized table.
pub fn table_pk(table: &str) -> Option<&'static str> {
    match table {
        "users" => Some("user_id"),
        "customers" => Some("customer_id"),
        "products" => Some("product_id"),
        "orders" => Some("order_id"),
        "order_items" => Some("item_id"),
        _ => None,
    }
}

/// Look up columns and pk together, or fail with the `SchemaMismatch`
/// variant the Replicator treats as "skip this change".
pub fn table_metadata(table: &str) -> Result<(&'static [&'static str], &'static str), ReplicationError> {
    let cols = table_columns(table)
        .ok_or_else(|| ReplicationError::SchemaMismatch(format!("unknown table: {table}")))?;
    let pk = table_pk(table)
        .ok_or_else(|| ReplicationError::SchemaMismatch(format!("no primary key declared for: {table}")))?;
    Ok((cols, pk))
}

/// DDL for one backend's copy of the synchronized tables plus its
/// local `change_log`. Idempotent (`IF NOT EXISTS`), safe to call on
/// every startup.
pub const BACKEND_SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    password_hash TEXT NOT NULL DEFAULT '',
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by_db TEXT NOT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS customers (
    customer_id TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by_db TEXT NOT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS products (
    product_id TEXT PRIMARY KEY,
    product_name TEXT NOT NULL,
    price REAL NOT NULL DEFAULT 0,
    stock INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by_db TEXT NOT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    order_date TEXT,
    total_amount REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by_db TEXT NOT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS order_items (
    item_id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1,
    price REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by_db TEXT NOT NULL,
    row_version INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS change_log (
    change_id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    pk_value TEXT NOT NULL,
    op_type TEXT NOT NULL CHECK(op_type IN ('I','U','D')),
    row_data TEXT NOT NULL,
    source_db TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_change_log_unprocessed
ON change_log(processed, change_id);
"#;

/// DDL for the control backend's `conflicts` table. Applied in
/// addition to `BACKEND_SCHEMA` on whichever tag is the control
/// backend, since the control backend also carries the five
/// synchronized tables.
pub const CONTROL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conflicts (
    conflict_id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    pk_value TEXT NOT NULL,
    source_db TEXT NOT NULL,
    target_db TEXT NOT NULL,
    source_row_data TEXT NOT NULL,
    target_row_data TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK(status IN ('OPEN','RESOLVED')),
    winner_db TEXT,
    resolved_by TEXT,
    resolved_at TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_conflicts_open
ON conflicts(status, table_name, pk_value);
"#;
