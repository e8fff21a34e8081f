//! StatementExecutor interface tests.
//!
//! Statements and position advances must commit together or not at all,
//! and a fenced commit lands only while its holder still owns the lease.
//! Rows are not read back here; the projection scenarios cover row contents.

use std::time::Duration;

use chrono::Utc;
use sea_query::{Alias, ColumnDef, Index, Table};

use iam_projector::events::Event;
use iam_projector::projection::{Column, Condition, Statement, StatementExecutor};
use iam_projector::storage::{LeaseFence, PositionStore, RunLock, StorageError};

use super::position_store_tests::position;

pub const TABLE: &str = "contract_rows";

fn event(sequence: u64) -> Event {
    Event {
        instance_id: "inst".into(),
        aggregate_type: "org".into(),
        aggregate_id: "o1".into(),
        resource_owner: "o1".into(),
        sequence,
        position: sequence,
        event_type: "org.added".into(),
        created_at: Utc::now(),
        payload: serde_json::json!({}),
    }
}

pub fn create(sequence: u64, id: &str) -> Statement {
    Statement::create(
        &event(sequence),
        TABLE,
        vec!["instance_id", "id"],
        vec![
            Column::new("instance_id", "inst"),
            Column::new("id", id),
            Column::new("name", format!("row {id}")),
        ],
    )
}

pub async fn ensure_contract_table<E: StatementExecutor>(executor: &E) {
    executor
        .ensure_table(
            Table::create()
                .table(Alias::new(TABLE))
                .if_not_exists()
                .col(ColumnDef::new(Alias::new("instance_id")).text().not_null())
                .col(ColumnDef::new(Alias::new("id")).text().not_null())
                .col(ColumnDef::new(Alias::new("name")).text())
                .primary_key(
                    Index::create()
                        .col(Alias::new("instance_id"))
                        .col(Alias::new("id")),
                )
                .to_owned(),
            vec![],
        )
        .await
        .expect("ensure_table should succeed");

    // Idempotent.
    executor
        .ensure_table(
            Table::create()
                .table(Alias::new(TABLE))
                .if_not_exists()
                .col(ColumnDef::new(Alias::new("instance_id")).text().not_null())
                .col(ColumnDef::new(Alias::new("id")).text().not_null())
                .col(ColumnDef::new(Alias::new("name")).text())
                .primary_key(
                    Index::create()
                        .col(Alias::new("instance_id"))
                        .col(Alias::new("id")),
                )
                .to_owned(),
            vec![],
        )
        .await
        .expect("ensure_table twice should succeed");
}

pub async fn test_empty_execute<E: StatementExecutor>(executor: &E) {
    executor.execute(&[], &[], None).await.expect("nothing to do is fine");
}

pub async fn test_statements_and_positions_commit<E: StatementExecutor, P: PositionStore>(
    executor: &E,
    positions: &P,
) {
    executor
        .execute(
            &[create(1, "a"), create(2, "b")],
            &[position("test_exec_commit", "inst", "org", 2)],
            None,
        )
        .await
        .expect("execute should succeed");

    let stored = positions
        .get("test_exec_commit", "inst", "org")
        .await
        .unwrap()
        .expect("position advanced with the statements");
    assert_eq!(stored.position, 2);
}

pub async fn test_duplicate_create_is_ignored<E: StatementExecutor>(executor: &E) {
    executor.execute(&[create(3, "dup")], &[], None).await.unwrap();
    executor
        .execute(&[create(3, "dup")], &[], None)
        .await
        .expect("re-creating by natural key is a no-op");
}

pub async fn test_failed_statement_rolls_back<E: StatementExecutor, P: PositionStore>(
    executor: &E,
    positions: &P,
) {
    let unscoped = Statement::delete(&event(5), TABLE, vec![]);
    let err = executor
        .execute(
            &[create(4, "c"), unscoped],
            &[position("test_exec_rollback", "inst", "org", 5)],
            None,
        )
        .await
        .expect_err("unscoped delete must fail");
    assert!(matches!(err, StorageError::Unscoped("delete", _)));

    let stored = positions
        .get("test_exec_rollback", "inst", "org")
        .await
        .unwrap();
    assert!(stored.is_none(), "position must not advance on failure");
}

pub async fn test_update_and_delete_scoped<E: StatementExecutor>(executor: &E) {
    executor.execute(&[create(6, "d")], &[], None).await.unwrap();
    executor
        .execute(
            &[
                Statement::update(
                    &event(7),
                    TABLE,
                    vec![Column::new("name", "renamed")],
                    vec![Condition::new("instance_id", "inst"), Condition::new("id", "d")],
                ),
                Statement::delete(
                    &event(8),
                    TABLE,
                    vec![Condition::new("instance_id", "inst"), Condition::new("id", "d")],
                ),
                // Deleting a missing row is fine.
                Statement::delete(
                    &event(9),
                    TABLE,
                    vec![Condition::new("instance_id", "inst"), Condition::new("id", "gone")],
                ),
            ],
            &[],
            None,
        )
        .await
        .expect("scoped update and delete should succeed");
}

pub async fn test_fenced_commit_by_holder<E: StatementExecutor, P: PositionStore, L: RunLock>(
    executor: &E,
    positions: &P,
    locks: &L,
) {
    let lease = Duration::from_secs(30);
    locks.try_acquire("test_exec_fenced", "a", lease).await.unwrap();

    executor
        .execute(
            &[create(10, "f")],
            &[position("test_exec_fenced", "inst", "org", 10)],
            Some(&LeaseFence::new("test_exec_fenced", "a", lease)),
        )
        .await
        .expect("holder's fenced commit should succeed");

    let stored = positions
        .get("test_exec_fenced", "inst", "org")
        .await
        .unwrap()
        .expect("position advanced under the lease");
    assert_eq!(stored.position, 10);
}

pub async fn test_stale_holder_commit_rejected<
    E: StatementExecutor,
    P: PositionStore,
    L: RunLock,
>(
    executor: &E,
    positions: &P,
    locks: &L,
) {
    let lease = Duration::from_secs(30);
    locks
        .try_acquire("test_exec_stale", "a", Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(locks
        .try_acquire("test_exec_stale", "b", lease)
        .await
        .unwrap()
        .is_acquired());

    let err = executor
        .execute(
            &[create(11, "stale")],
            &[position("test_exec_stale", "inst", "org", 11)],
            Some(&LeaseFence::new("test_exec_stale", "a", lease)),
        )
        .await
        .expect_err("a taken-over lease must not commit");
    assert!(matches!(err, StorageError::LeaseLost(_)));

    let stored = positions.get("test_exec_stale", "inst", "org").await.unwrap();
    assert!(stored.is_none(), "position must not advance without the lease");
    assert!(
        !locks.renew("test_exec_stale", "a", lease).await.unwrap(),
        "the rejected commit must not hand the lease back"
    );
}

pub async fn test_expired_fence_rejected<E: StatementExecutor, L: RunLock>(
    executor: &E,
    locks: &L,
) {
    locks
        .try_acquire("test_exec_expired", "a", Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = executor
        .execute(
            &[create(12, "late")],
            &[position("test_exec_expired", "inst", "org", 12)],
            Some(&LeaseFence::new(
                "test_exec_expired",
                "a",
                Duration::from_secs(30),
            )),
        )
        .await
        .expect_err("an expired lease must not commit");
    assert!(matches!(err, StorageError::LeaseLost(_)));
}

/// Run all StatementExecutor interface tests. `positions` must be the store
/// the executor advances and `locks` the run lock it fences on.
#[macro_export]
macro_rules! run_executor_tests {
    ($executor:expr, $positions:expr, $locks:expr) => {
        use $crate::storage::executor_tests::*;

        ensure_contract_table($executor).await;
        println!("  ensure_contract_table: PASSED");

        test_empty_execute($executor).await;
        println!("  test_empty_execute: PASSED");

        test_statements_and_positions_commit($executor, $positions).await;
        println!("  test_statements_and_positions_commit: PASSED");

        test_duplicate_create_is_ignored($executor).await;
        println!("  test_duplicate_create_is_ignored: PASSED");

        test_failed_statement_rolls_back($executor, $positions).await;
        println!("  test_failed_statement_rolls_back: PASSED");

        test_update_and_delete_scoped($executor).await;
        println!("  test_update_and_delete_scoped: PASSED");

        test_fenced_commit_by_holder($executor, $positions, $locks).await;
        println!("  test_fenced_commit_by_holder: PASSED");

        test_stale_holder_commit_rejected($executor, $positions, $locks).await;
        println!("  test_stale_holder_commit_rejected: PASSED");

        test_expired_fence_rejected($executor, $locks).await;
        println!("  test_expired_fence_rejected: PASSED");
    };
}
