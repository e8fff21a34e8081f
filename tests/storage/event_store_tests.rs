//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use serde_json::json;

use iam_projector::events::NewEvent;
use iam_projector::storage::{EventFilter, EventStore};

/// Create a user event for the given tenant.
pub fn user_event(instance_id: &str, user_id: &str, event_type: &str) -> NewEvent {
    NewEvent::new(instance_id, "user", user_id, event_type)
        .owned_by("org1")
        .with_payload(json!({ "userId": user_id }))
}

fn filter(instance_id: &str, after_position: u64, limit: usize) -> EventFilter {
    EventFilter {
        instance_id: instance_id.to_string(),
        aggregate_types: vec!["user".to_string()],
        event_types: vec!["user.locked".to_string(), "user.removed".to_string()],
        after_position,
        limit,
    }
}

// =============================================================================
// EventStore::append tests
// =============================================================================

pub async fn test_append_assigns_positions_and_sequences<S: EventStore>(store: &S) {
    let inst = "test_append_seq";

    let committed = store
        .append(vec![
            user_event(inst, "u1", "user.locked"),
            user_event(inst, "u2", "user.locked"),
            user_event(inst, "u1", "user.removed"),
        ])
        .await
        .expect("append should succeed");

    assert_eq!(committed.len(), 3);
    assert!(committed[0].position < committed[1].position);
    assert!(committed[1].position < committed[2].position);

    let u1: Vec<_> = committed.iter().filter(|e| e.aggregate_id == "u1").collect();
    assert_eq!(u1[0].sequence + 1, u1[1].sequence, "per-aggregate sequence");
    assert_eq!(committed[1].sequence, 1, "first event of u2 starts at 1");
}

pub async fn test_append_continues_sequence<S: EventStore>(store: &S) {
    let inst = "test_append_continue";

    let first = store
        .append(vec![user_event(inst, "u1", "user.locked")])
        .await
        .unwrap();
    let second = store
        .append(vec![user_event(inst, "u1", "user.removed")])
        .await
        .unwrap();

    assert_eq!(second[0].sequence, first[0].sequence + 1);
    assert!(second[0].position > first[0].position);
}

pub async fn test_append_empty<S: EventStore>(store: &S) {
    let committed = store.append(vec![]).await.expect("empty append is fine");
    assert!(committed.is_empty());
}

// =============================================================================
// EventStore::query tests
// =============================================================================

pub async fn test_query_filters_and_orders<S: EventStore>(store: &S) {
    let inst = "test_query_filter";

    store
        .append(vec![
            user_event(inst, "u1", "user.locked"),
            user_event(inst, "u1", "user.human.added"),
            user_event("test_query_other_tenant", "u1", "user.locked"),
            user_event(inst, "u2", "user.removed"),
        ])
        .await
        .unwrap();

    let events = store.query(&filter(inst, 0, 10)).await.unwrap();

    assert_eq!(events.len(), 2, "other tenants and event types are filtered");
    assert_eq!(events[0].event_type, "user.locked");
    assert_eq!(events[1].event_type, "user.removed");
    assert!(events[0].position < events[1].position);
    assert_eq!(events[0].payload, json!({ "userId": "u1" }));
    assert_eq!(events[0].resource_owner, "org1");
}

pub async fn test_query_after_position_and_limit<S: EventStore>(store: &S) {
    let inst = "test_query_after";

    let committed = store
        .append(vec![
            user_event(inst, "u1", "user.locked"),
            user_event(inst, "u2", "user.locked"),
            user_event(inst, "u3", "user.locked"),
        ])
        .await
        .unwrap();

    let events = store
        .query(&filter(inst, committed[0].position, 1))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate_id, "u2");

    let events = store
        .query(&filter(inst, committed[2].position, 10))
        .await
        .unwrap();
    assert!(events.is_empty());
}

pub async fn test_query_empty_types<S: EventStore>(store: &S) {
    let inst = "test_query_empty_types";
    store
        .append(vec![user_event(inst, "u1", "user.locked")])
        .await
        .unwrap();

    let mut f = filter(inst, 0, 10);
    f.event_types.clear();
    assert!(store.query(&f).await.unwrap().is_empty());
}

// =============================================================================
// EventStore::instances / subscribe tests
// =============================================================================

pub async fn test_instances<S: EventStore>(store: &S) {
    store
        .append(vec![
            user_event("test_instances_b", "u1", "user.locked"),
            user_event("test_instances_a", "u1", "user.locked"),
        ])
        .await
        .unwrap();

    let instances = store.instances().await.unwrap();
    let a = instances.iter().position(|i| i == "test_instances_a");
    let b = instances.iter().position(|i| i == "test_instances_b");
    assert!(a.is_some() && b.is_some());
    assert!(a < b, "instances are sorted");
    assert_eq!(
        instances.iter().filter(|i| *i == "test_instances_a").count(),
        1,
        "instances are distinct"
    );
}

pub async fn test_subscribe_notifies_append<S: EventStore>(store: &S) {
    let Some(mut rx) = store.subscribe() else {
        return;
    };

    let committed = store
        .append(vec![user_event("test_subscribe", "u1", "user.locked")])
        .await
        .unwrap();

    let notification = rx.recv().await.expect("notification after append");
    assert_eq!(notification.instance_id, "test_subscribe");
    assert_eq!(notification.position, committed[0].position);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        test_append_assigns_positions_and_sequences($store).await;
        println!("  test_append_assigns_positions_and_sequences: PASSED");

        test_append_continues_sequence($store).await;
        println!("  test_append_continues_sequence: PASSED");

        test_append_empty($store).await;
        println!("  test_append_empty: PASSED");

        test_query_filters_and_orders($store).await;
        println!("  test_query_filters_and_orders: PASSED");

        test_query_after_position_and_limit($store).await;
        println!("  test_query_after_position_and_limit: PASSED");

        test_query_empty_types($store).await;
        println!("  test_query_empty_types: PASSED");

        test_instances($store).await;
        println!("  test_instances: PASSED");

        test_subscribe_notifies_append($store).await;
        println!("  test_subscribe_notifies_append: PASSED");
    };
}
