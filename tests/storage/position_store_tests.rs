//! PositionStore interface tests.
//!
//! These tests verify the contract of the PositionStore trait.
//! Each storage implementation should run these tests.

use iam_projector::storage::{Position, PositionStore};

pub fn position(projection: &str, instance_id: &str, aggregate_type: &str, at: u64) -> Position {
    let mut p = Position::initial(projection, instance_id, aggregate_type);
    p.position = at;
    p.aggregate_id = format!("agg_{at}");
    p.sequence = at;
    p
}

// =============================================================================
// PositionStore::get tests
// =============================================================================

pub async fn test_get_nonexistent<S: PositionStore>(store: &S) {
    let result = store
        .get("test_pos_none", "inst", "user")
        .await
        .expect("get should succeed");
    assert!(result.is_none(), "nonexistent position should be None");
}

// =============================================================================
// PositionStore::put tests
// =============================================================================

pub async fn test_put_and_get<S: PositionStore>(store: &S) {
    store
        .put(&position("test_pos_put_get", "inst", "user", 42))
        .await
        .expect("put should succeed");

    let result = store
        .get("test_pos_put_get", "inst", "user")
        .await
        .expect("get should succeed")
        .expect("position should exist");

    assert_eq!(result.position, 42);
    assert_eq!(result.aggregate_id, "agg_42");
    assert_eq!(result.sequence, 42);
}

pub async fn test_put_advances<S: PositionStore>(store: &S) {
    store.put(&position("test_pos_advance", "inst", "user", 10)).await.unwrap();
    store.put(&position("test_pos_advance", "inst", "user", 25)).await.unwrap();

    let result = store
        .get("test_pos_advance", "inst", "user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.position, 25);
}

pub async fn test_put_never_regresses<S: PositionStore>(store: &S) {
    store.put(&position("test_pos_monotonic", "inst", "user", 30)).await.unwrap();
    store.put(&position("test_pos_monotonic", "inst", "user", 12)).await.unwrap();

    let result = store
        .get("test_pos_monotonic", "inst", "user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.position, 30, "older position must not overwrite newer");
}

// =============================================================================
// Isolation tests
// =============================================================================

pub async fn test_get_all_scoped_and_sorted<S: PositionStore>(store: &S) {
    store.put(&position("test_pos_all", "inst", "user", 5)).await.unwrap();
    store.put(&position("test_pos_all", "inst", "instance", 7)).await.unwrap();
    store.put(&position("test_pos_all", "inst", "org", 6)).await.unwrap();
    store.put(&position("test_pos_all", "other", "user", 9)).await.unwrap();
    store.put(&position("test_pos_all_other", "inst", "user", 11)).await.unwrap();

    let all = store.get_all("test_pos_all", "inst").await.unwrap();
    let types: Vec<_> = all.iter().map(|p| p.aggregate_type.as_str()).collect();
    assert_eq!(types, vec!["instance", "org", "user"]);
    assert_eq!(all[2].position, 5);
}

pub async fn test_projection_isolation<S: PositionStore>(store: &S) {
    store.put(&position("test_pos_iso_a", "inst", "user", 3)).await.unwrap();
    store.put(&position("test_pos_iso_b", "inst", "user", 8)).await.unwrap();

    let a = store.get("test_pos_iso_a", "inst", "user").await.unwrap().unwrap();
    let b = store.get("test_pos_iso_b", "inst", "user").await.unwrap().unwrap();
    assert_eq!(a.position, 3);
    assert_eq!(b.position, 8);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all PositionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_position_store_tests {
    ($store:expr) => {
        use $crate::storage::position_store_tests::*;

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_put_advances($store).await;
        println!("  test_put_advances: PASSED");

        test_put_never_regresses($store).await;
        println!("  test_put_never_regresses: PASSED");

        test_get_all_scoped_and_sorted($store).await;
        println!("  test_get_all_scoped_and_sorted: PASSED");

        test_projection_isolation($store).await;
        println!("  test_projection_isolation: PASSED");
    };
}
