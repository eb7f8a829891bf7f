//! End-to-end scenarios S1-S6, each driven against three real
//! tempfile-backed SQLite backends through the public crate surface
//! rather than any single module's internals.

use replication_fabric::{
    apply_change, change_log, resolve_with_backend, resolve_with_custom, ApplyOutcome, BackendRegistry, BackendTag,
    ChangeLogRow, Config, LoggingNotifier, RowData, Winner,
};
use serde_json::json;

fn registry() -> BackendRegistry {
    BackendRegistry::new(Config::for_tests())
}

fn product(pk: &str, price: i64, stock: i64, version: i64, stamp: &str) -> serde_json::Value {
    json!({
        "product_id": pk,
        "product_name": "Widget",
        "price": price,
        "stock": stock,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z",
        "updated_by_db": stamp,
        "row_version": version,
    })
}

fn price_and_stock(registry: &BackendRegistry, tag: BackendTag, pk: &str) -> (i64, i64) {
    let pool = registry.engine(tag).unwrap();
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT price, stock FROM products WHERE product_id = ?1",
        [pk],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .unwrap()
}

#[test]
fn s1_insert_on_a_replicates_to_b_and_c() {
    let registry = registry();
    let notifier = LoggingNotifier;

    let change = ChangeLogRow {
        change_id: 1,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "I".into(),
        row_data: product("P1", 10, 5, 1, "A"),
        source_db: "A".into(),
    };

    let outcome = apply_change(&registry, &notifier, BackendTag::A, &change).unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);

    for tag in [BackendTag::B, BackendTag::C] {
        assert_eq!(price_and_stock(&registry, tag, "P1"), (10, 5));
    }
}

#[test]
fn s2_equal_concurrent_versions_converge_last_processed_wins() {
    let registry = registry();
    let notifier = LoggingNotifier;

    // P1 v1 on all three.
    let seed = ChangeLogRow {
        change_id: 1,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "I".into(),
        row_data: product("P1", 10, 5, 1, "A"),
        source_db: "A".into(),
    };
    apply_change(&registry, &notifier, BackendTag::A, &seed).unwrap();

    // A independently advances stock to 7 (v2, by A).
    let a_change = ChangeLogRow {
        change_id: 2,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "U".into(),
        row_data: product("P1", 10, 7, 2, "A"),
        source_db: "A".into(),
    };
    // B independently advances price to 12 (v2, by B), applied
    // directly, standing in for B's own local write before A's change
    // is processed against it.
    {
        let pool = registry.engine(BackendTag::B).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE products SET price = 12, row_version = 2, updated_by_db = 'B' WHERE product_id = 'P1'",
            [],
        )
        .unwrap();
    }

    // Worker processes A's change first: on B, target v2 by B != A,
    // but versions are equal (strict > only), so no conflict. A's
    // row overwrites B's.
    let outcome_a = apply_change(&registry, &notifier, BackendTag::A, &a_change).unwrap();
    assert_eq!(outcome_a, ApplyOutcome::Applied);
    assert_eq!(price_and_stock(&registry, BackendTag::B, "P1"), (10, 7));

    // Then B's change is processed: on A, target v2 by A, incoming v2
    // by B, v2 > v2 is false, so A is overwritten by B's row.
    let b_change = ChangeLogRow {
        change_id: 3,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "U".into(),
        row_data: product("P1", 12, 5, 2, "B"),
        source_db: "B".into(),
    };
    let outcome_b = apply_change(&registry, &notifier, BackendTag::B, &b_change).unwrap();
    assert_eq!(outcome_b, ApplyOutcome::Applied);
    assert_eq!(price_and_stock(&registry, BackendTag::A, "P1"), (12, 5));

    // No conflict was ever raised for this sequence, the documented
    // convergence limit, not a bug.
    let control_pool = registry.engine(registry.control_tag()).unwrap();
    assert!(replication_fabric::conflict::list_open(&control_pool).unwrap().is_empty());
}

#[test]
fn s3_concurrent_edit_raises_conflict() {
    let registry = registry();
    let notifier = LoggingNotifier;

    let seed = ChangeLogRow {
        change_id: 1,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "I".into(),
        row_data: product("P1", 10, 5, 1, "A"),
        source_db: "A".into(),
    };
    apply_change(&registry, &notifier, BackendTag::A, &seed).unwrap();

    {
        let pool = registry.engine(BackendTag::B).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE products SET row_version = 3, updated_by_db = 'B' WHERE product_id = 'P1'",
            [],
        )
        .unwrap();
    }

    let change = ChangeLogRow {
        change_id: 2,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "U".into(),
        row_data: product("P1", 20, 5, 2, "A"),
        source_db: "A".into(),
    };
    let outcome = apply_change(&registry, &notifier, BackendTag::A, &change).unwrap();
    let conflict_id = match outcome {
        ApplyOutcome::Conflict(id) => id,
        other => panic!("expected conflict, got {other:?}"),
    };

    let control_pool = registry.engine(registry.control_tag()).unwrap();
    let open = replication_fabric::conflict::list_open(&control_pool).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].conflict_id, conflict_id);
}

fn open_s3_conflict(registry: &BackendRegistry) -> i64 {
    let notifier = LoggingNotifier;
    let seed = ChangeLogRow {
        change_id: 1,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "I".into(),
        row_data: product("P1", 10, 5, 1, "A"),
        source_db: "A".into(),
    };
    apply_change(registry, &notifier, BackendTag::A, &seed).unwrap();

    {
        let pool = registry.engine(BackendTag::B).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE products SET row_version = 3, updated_by_db = 'B' WHERE product_id = 'P1'",
            [],
        )
        .unwrap();
    }

    let change = ChangeLogRow {
        change_id: 2,
        table_name: "products".into(),
        pk_value: "P1".into(),
        op_type: "U".into(),
        row_data: product("P1", 20, 5, 2, "A"),
        source_db: "A".into(),
    };
    match apply_change(registry, &notifier, BackendTag::A, &change).unwrap() {
        ApplyOutcome::Conflict(id) => id,
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn s4_resolve_with_source_rebroadcasts_everywhere() {
    let registry = registry();
    let conflict_id = open_s3_conflict(&registry);

    resolve_with_backend(&registry, &LoggingNotifier, conflict_id, Winner::Source, "admin").unwrap();

    for tag in [BackendTag::A, BackendTag::B, BackendTag::C] {
        assert_eq!(price_and_stock(&registry, tag, "P1"), (20, 5));
    }

    let control_pool = registry.engine(registry.control_tag()).unwrap();
    let resolved = replication_fabric::conflict::get(&control_pool, conflict_id).unwrap().unwrap();
    assert_eq!(resolved.status, "RESOLVED");
    assert_eq!(resolved.winner_db.as_deref(), Some("A"));
}

#[test]
fn s5_resolve_with_custom_override() {
    let registry = registry();
    let conflict_id = open_s3_conflict(&registry);

    let mut overrides = RowData::new();
    overrides.insert("price".to_string(), json!(15));

    resolve_with_custom(&registry, &LoggingNotifier, conflict_id, &overrides, "admin_identifier_long").unwrap();

    for tag in [BackendTag::A, BackendTag::B, BackendTag::C] {
        let pool = registry.engine(tag).unwrap();
        let conn = pool.get().unwrap();
        let (price, stamp): (i64, String) = conn
            .query_row(
                "SELECT price, updated_by_db FROM products WHERE product_id = 'P1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(price, 15);
        assert_eq!(stamp, "ADMIN_IDENTIFIER"); // first 16 chars, uppercased
    }

    let control_pool = registry.engine(registry.control_tag()).unwrap();
    let resolved = replication_fabric::conflict::get(&control_pool, conflict_id).unwrap().unwrap();
    assert_eq!(resolved.winner_db.as_deref(), Some("CUSTOM"));
}

#[test]
fn s6_batch_size_caps_a_single_tick() {
    let registry = registry();
    let pool = registry.engine(BackendTag::B).unwrap();

    for i in 0..300 {
        change_log::append(
            &pool,
            "products",
            &format!("P{i}"),
            "I",
            &product(&format!("P{i}"), 1, 1, 1, "B"),
            BackendTag::B,
        )
        .unwrap();
    }

    let batch = change_log::fetch_unprocessed(&pool, BackendTag::B, 100);
    assert_eq!(batch.len(), 100);

    let notifier = LoggingNotifier;
    let mut processed = 0;
    for change in &batch {
        apply_change(&registry, &notifier, BackendTag::B, change).unwrap();
        change_log::mark_processed(&pool, change.change_id).unwrap();
        processed += 1;
    }
    assert_eq!(processed, 100);

    let remaining = change_log::fetch_unprocessed(&pool, BackendTag::B, 300);
    assert_eq!(remaining.len(), 200);
}
