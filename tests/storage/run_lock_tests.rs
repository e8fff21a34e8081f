//! RunLock interface tests.
//!
//! These tests verify the lease semantics every RunLock must provide.

use std::time::Duration;

use iam_projector::storage::{LockOutcome, RunLock};

const LEASE: Duration = Duration::from_secs(30);

pub async fn test_acquire_free_lock<L: RunLock>(lock: &L) {
    let outcome = lock
        .try_acquire("test_lock_free", "a", LEASE)
        .await
        .expect("acquire should succeed");
    assert!(outcome.is_acquired());
}

pub async fn test_held_by_other<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_held", "a", LEASE).await.unwrap();

    let outcome = lock.try_acquire("test_lock_held", "b", LEASE).await.unwrap();
    match outcome {
        LockOutcome::Held { holder, .. } => assert_eq!(holder, "a"),
        other => panic!("expected Held, got {other:?}"),
    }
}

pub async fn test_reacquire_by_holder<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_reacquire", "a", LEASE).await.unwrap();
    let outcome = lock
        .try_acquire("test_lock_reacquire", "a", LEASE)
        .await
        .unwrap();
    assert!(outcome.is_acquired());
}

pub async fn test_renew_only_by_holder<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_renew", "a", LEASE).await.unwrap();

    assert!(lock.renew("test_lock_renew", "a", LEASE).await.unwrap());
    assert!(!lock.renew("test_lock_renew", "b", LEASE).await.unwrap());
}

pub async fn test_release_frees_lock<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_release", "a", LEASE).await.unwrap();

    // A stranger's release is ignored.
    lock.release("test_lock_release", "b").await.unwrap();
    assert!(!lock
        .try_acquire("test_lock_release", "b", LEASE)
        .await
        .unwrap()
        .is_acquired());

    lock.release("test_lock_release", "a").await.unwrap();
    assert!(lock
        .try_acquire("test_lock_release", "b", LEASE)
        .await
        .unwrap()
        .is_acquired());
    assert!(!lock.renew("test_lock_release", "a", LEASE).await.unwrap());
}

pub async fn test_expired_lease_is_taken_over<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_expiry", "a", Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = lock.try_acquire("test_lock_expiry", "b", LEASE).await.unwrap();
    assert!(outcome.is_acquired(), "expired lease must be claimable");
}

pub async fn test_expired_lease_cannot_be_renewed<L: RunLock>(lock: &L) {
    lock.try_acquire("test_lock_renew_expired", "a", Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(
        !lock.renew("test_lock_renew_expired", "a", LEASE).await.unwrap(),
        "an expired lease is gone even if nobody claimed it"
    );
}

/// Run all RunLock interface tests against a lock implementation.
#[macro_export]
macro_rules! run_lock_tests {
    ($lock:expr) => {
        use $crate::storage::run_lock_tests::*;

        test_acquire_free_lock($lock).await;
        println!("  test_acquire_free_lock: PASSED");

        test_held_by_other($lock).await;
        println!("  test_held_by_other: PASSED");

        test_reacquire_by_holder($lock).await;
        println!("  test_reacquire_by_holder: PASSED");

        test_renew_only_by_holder($lock).await;
        println!("  test_renew_only_by_holder: PASSED");

        test_release_frees_lock($lock).await;
        println!("  test_release_frees_lock: PASSED");

        test_expired_lease_is_taken_over($lock).await;
        println!("  test_expired_lease_is_taken_over: PASSED");

        test_expired_lease_cannot_be_renewed($lock).await;
        println!("  test_expired_lease_cannot_be_renewed: PASSED");
    };
}
