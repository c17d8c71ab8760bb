//! Integration tests for the registry actor through its public handle.
//!
//! These run the real actor task and exercise it concurrently, the way the
//! sessions do.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - production code cannot.

use std::collections::BTreeSet;
use std::time::Duration;

use relay_core::{DisplayName, SessionId};
use relayd::registry::{spawn_registry, RegistryHandle, RelayEvent};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Joins `name` as session `id`, returning the session's inbox.
async fn join(
    registry: &RegistryHandle,
    id: u64,
    name: &str,
) -> mpsc::UnboundedReceiver<String> {
    let (outbox, inbox) = mpsc::unbounded_channel();
    registry
        .add_name(DisplayName::from(name), SessionId::new(id), outbox)
        .await
        .expect("add_name");
    inbox
}

fn names(snapshot: Vec<DisplayName>) -> Vec<String> {
    snapshot.into_iter().map(DisplayName::into_inner).collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let registry = spawn_registry();

    assert!(!registry.has_any().await);
    assert!(registry.snapshot_names().await.is_empty());

    let _alice = join(&registry, 1, "alice").await;
    assert!(registry.has_any().await);
    assert_eq!(names(registry.snapshot_names().await), vec!["alice"]);

    assert!(
        registry
            .remove_name(DisplayName::from("alice"), SessionId::new(1))
            .await
    );
    assert!(!registry.has_any().await);
    assert!(registry.snapshot_names().await.is_empty());
}

#[tokio::test]
async fn test_remove_never_joined() {
    let registry = spawn_registry();
    let mut events = registry.subscribe();

    assert!(
        !registry
            .remove_name(DisplayName::from("ghost"), SessionId::new(9))
            .await
    );

    // No departure is published for somebody who never joined
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_snapshot_is_a_copy() {
    let registry = spawn_registry();
    let _alice = join(&registry, 1, "alice").await;

    let snapshot = registry.snapshot_names().await;
    let _bob = join(&registry, 2, "bob").await;

    // Taken before bob joined; unaffected by it
    assert_eq!(names(snapshot), vec!["alice"]);
    assert_eq!(names(registry.snapshot_names().await), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_departure_event() {
    let registry = spawn_registry();
    let mut events = registry.subscribe();

    let _alice = join(&registry, 1, "alice").await;
    registry
        .remove_name(DisplayName::from("alice"), SessionId::new(1))
        .await;

    let event = timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("event in time")
        .unwrap();
    assert_eq!(
        event,
        RelayEvent::Disconnected {
            session_id: SessionId::new(1),
            name: DisplayName::from("alice"),
        }
    );
}

// ============================================================================
// Broadcast
// ============================================================================

#[tokio::test]
async fn test_broadcast_fan_out() {
    let registry = spawn_registry();

    let mut alice = join(&registry, 1, "alice").await;
    let mut bob = join(&registry, 2, "bob").await;
    let mut carol = join(&registry, 3, "carol").await;

    assert_eq!(registry.broadcast("bob: hi all", SessionId::new(2)).await, 2);

    assert_eq!(alice.recv().await.unwrap(), "bob: hi all");
    assert_eq!(carol.recv().await.unwrap(), "bob: hi all");
    assert!(bob.try_recv().is_err());
}

#[tokio::test]
async fn test_broadcast_with_nobody_else() {
    let registry = spawn_registry();
    let mut alice = join(&registry, 1, "alice").await;

    assert_eq!(registry.broadcast("alice: echo?", SessionId::new(1)).await, 0);
    assert!(alice.try_recv().is_err());
}

#[tokio::test]
async fn test_broadcast_survives_dead_recipient() {
    let registry = spawn_registry();

    let _alice = join(&registry, 1, "alice").await;
    let bob = join(&registry, 2, "bob").await;
    let mut carol = join(&registry, 3, "carol").await;
    drop(bob);

    assert_eq!(registry.broadcast("alice: hello", SessionId::new(1)).await, 1);
    assert_eq!(carol.recv().await.unwrap(), "alice: hello");
}

#[tokio::test]
async fn test_per_recipient_order_across_senders() {
    let registry = spawn_registry();

    let mut listener = join(&registry, 0, "listener").await;
    let _a = join(&registry, 1, "a").await;
    let _b = join(&registry, 2, "b").await;

    // Two senders interleave freely; each sender's own lines must stay in order
    let mut tasks = Vec::new();
    for (id, name) in [(1u64, "a"), (2u64, "b")] {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                registry
                    .broadcast(format!("{name}: {i}"), SessionId::new(id))
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut next = [0usize; 2];
    for _ in 0..100 {
        let line = listener.recv().await.unwrap();
        let (who, n) = line.split_once(": ").unwrap();
        let slot = if who == "a" { 0 } else { 1 };
        assert_eq!(n.parse::<usize>().unwrap(), next[slot], "out of order: {line}");
        next[slot] += 1;
    }
    assert_eq!(next, [50, 50]);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins() {
    let registry = spawn_registry();

    let mut tasks = Vec::new();
    for i in 0..50u64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            join(&registry, i, &format!("user-{i:02}")).await
        }));
    }

    let mut inboxes = Vec::new();
    for task in tasks {
        inboxes.push(task.await.unwrap());
    }

    let expected: BTreeSet<String> = (0..50).map(|i| format!("user-{i:02}")).collect();
    let actual: BTreeSet<String> = names(registry.snapshot_names().await).into_iter().collect();
    assert_eq!(actual, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_removal_succeeds_once() {
    let registry = spawn_registry();
    let _alice = join(&registry, 1, "alice").await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .remove_name(DisplayName::from("alice"), SessionId::new(1))
                .await
        }));
    }

    let mut removed = 0;
    for task in tasks {
        if task.await.unwrap() {
            removed += 1;
        }
    }

    assert_eq!(removed, 1);
    assert!(!registry.has_any().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_and_leave() {
    let registry = spawn_registry();

    let mut tasks = Vec::new();
    for i in 0..40u64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("user-{i:02}");
            let _inbox = join(&registry, i, &name).await;
            registry.broadcast(format!("{name}: hi"), SessionId::new(i)).await;
            // Even sessions leave again
            if i % 2 == 0 {
                assert!(
                    registry
                        .remove_name(DisplayName::from(name), SessionId::new(i))
                        .await
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let remaining = names(registry.snapshot_names().await);
    let expected: Vec<String> = (0..40)
        .filter(|i| i % 2 == 1)
        .map(|i| format!("user-{i:02}"))
        .collect();
    assert_eq!(remaining, expected);
}
