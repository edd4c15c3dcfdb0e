//! Progress channel behaviour
//!
//! Covers:
//! - ordered delivery with buffered replay for late subscribers
//! - idempotent unsubscribe (including after channel removal)
//! - no delivery after a terminal event
//! - grace-period and max-age cleanup
//! - stale timers never remove a recreated channel

use classmoji_common::progress::{
    ProgressConfig, ProgressStore, ProgressStreamManager, Subscriber,
};
use classmoji_common::ProgressEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const IMPORT_ID: &str = "a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";

fn test_config() -> ProgressConfig {
    ProgressConfig {
        grace_period_ms: 500,
        max_age_secs: 60,
    }
}

type Seen = Arc<Mutex<Vec<ProgressEvent>>>;

fn recorder() -> (Seen, Box<dyn Subscriber>) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscriber: Box<dyn Subscriber> = Box::new(move |event: &ProgressEvent| {
        sink.lock().unwrap().push(event.clone());
    });
    (seen, subscriber)
}

fn snapshot(seen: &Seen) -> Vec<ProgressEvent> {
    seen.lock().unwrap().clone()
}

/// Let spawned cleanup tasks run after the paused clock moved
async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    tokio::task::yield_now().await;
}

// =============================================================================
// Delivery ordering
// =============================================================================

#[tokio::test]
async fn test_subscribe_step_done_scenario() {
    let manager = ProgressStreamManager::new(test_config());
    let (seen, subscriber) = recorder();
    let _subscription = manager.subscribe(IMPORT_ID, subscriber);

    assert!(manager.publish(IMPORT_ID, ProgressEvent::step("Importing", 1, 5)));
    assert!(manager.publish(IMPORT_ID, ProgressEvent::done("xyz")));
    assert!(!manager.publish(IMPORT_ID, ProgressEvent::step("Importing", 2, 5)));

    assert_eq!(
        snapshot(&seen),
        vec![ProgressEvent::step("Importing", 1, 5), ProgressEvent::done("xyz")],
        "callback invoked exactly twice, in order"
    );
}

#[tokio::test]
async fn test_late_subscriber_gets_prefix_then_suffix() {
    let manager = ProgressStreamManager::new(test_config());
    let events: Vec<_> = (1..=6)
        .map(|i| ProgressEvent::step(format!("step {}", i), i, 6))
        .collect();

    let (early, early_sub) = recorder();
    let _early = manager.subscribe(IMPORT_ID, early_sub);

    for event in &events[..3] {
        manager.publish(IMPORT_ID, event.clone());
    }

    let (late, late_sub) = recorder();
    let _late = manager.subscribe(IMPORT_ID, late_sub);

    for event in &events[3..] {
        manager.publish(IMPORT_ID, event.clone());
    }

    assert_eq!(snapshot(&early), events);
    assert_eq!(snapshot(&late), events, "no gaps and no duplicates");
}

#[tokio::test]
async fn test_subscribers_delivered_in_registration_order() {
    let manager = ProgressStreamManager::new(test_config());
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut subscriptions = Vec::new();
    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        subscriptions.push(manager.subscribe(
            IMPORT_ID,
            Box::new(move |_: &ProgressEvent| order.lock().unwrap().push(name)),
        ));
    }

    manager.publish(IMPORT_ID, ProgressEvent::step("s", 1, 1));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_channels_are_independent() {
    let manager = ProgressStreamManager::new(test_config());
    let (seen_a, sub_a) = recorder();
    let (seen_b, sub_b) = recorder();
    let _a = manager.subscribe("import-a", sub_a);
    let _b = manager.subscribe("import-b", sub_b);

    manager.publish("import-a", ProgressEvent::done("a"));
    manager.publish("import-b", ProgressEvent::step("b", 1, 2));

    assert_eq!(snapshot(&seen_a), vec![ProgressEvent::done("a")]);
    assert_eq!(snapshot(&seen_b), vec![ProgressEvent::step("b", 1, 2)]);
    assert!(manager.is_closed("import-a"));
    assert!(!manager.is_closed("import-b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publish_and_subscribe_never_duplicates() {
    let manager = ProgressStreamManager::new(test_config());
    let total = 200u32;

    let producer = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for i in 1..=total {
                manager.publish(IMPORT_ID, ProgressEvent::step("bulk", i, total));
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut consumers = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        consumers.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            let (seen, subscriber) = recorder();
            let subscription = manager.subscribe(IMPORT_ID, subscriber);
            (seen, subscription)
        }));
    }

    producer.await.unwrap();
    for consumer in consumers {
        let (seen, _subscription) = consumer.await.unwrap();
        let currents: Vec<u32> = snapshot(&seen)
            .into_iter()
            .map(|event| match event {
                ProgressEvent::Step { current, .. } => current,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let expected: Vec<u32> = (1..=total).collect();
        assert_eq!(currents, expected, "every subscriber sees 1..=total exactly once");
    }
}

// =============================================================================
// Unsubscribe
// =============================================================================

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let manager = ProgressStreamManager::new(test_config());
    let (seen, subscriber) = recorder();
    let mut subscription = manager.subscribe(IMPORT_ID, subscriber);

    subscription.cancel();
    subscription.cancel();

    manager.publish(IMPORT_ID, ProgressEvent::step("after", 1, 1));
    assert!(snapshot(&seen).is_empty());
    assert_eq!(manager.subscriber_count(IMPORT_ID), 0);
}

#[tokio::test]
async fn test_unsubscribe_after_channel_removed_is_noop() {
    let manager = ProgressStreamManager::new(test_config());
    let (_seen, subscriber) = recorder();
    let mut subscription = manager.subscribe(IMPORT_ID, subscriber);

    assert!(manager.remove(IMPORT_ID));
    subscription.cancel();
    subscription.cancel();

    assert_eq!(manager.channel_count(), 0);
}

#[tokio::test]
async fn test_stale_unsubscribe_leaves_new_channel_alone() {
    let manager = ProgressStreamManager::new(test_config());
    let (_old, old_sub) = recorder();
    let mut old_subscription = manager.subscribe(IMPORT_ID, old_sub);
    manager.remove(IMPORT_ID);

    let (new_seen, new_sub) = recorder();
    let _new_subscription = manager.subscribe(IMPORT_ID, new_sub);
    old_subscription.cancel();

    manager.publish(IMPORT_ID, ProgressEvent::step("fresh", 1, 1));
    assert_eq!(snapshot(&new_seen), vec![ProgressEvent::step("fresh", 1, 1)]);
}

#[tokio::test]
async fn test_unsubscribe_after_manager_dropped_is_noop() {
    let manager = ProgressStreamManager::new(test_config());
    let (_seen, subscriber) = recorder();
    let mut subscription = manager.subscribe(IMPORT_ID, subscriber);

    drop(manager);
    subscription.cancel();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_terminal_event_removes_channel_after_grace_period() {
    let manager = ProgressStreamManager::new(test_config());
    let (_seen, subscriber) = recorder();
    let _subscription = manager.subscribe(IMPORT_ID, subscriber);

    manager.publish(IMPORT_ID, ProgressEvent::error("GitHub API unavailable"));
    assert!(manager.is_closed(IMPORT_ID));

    advance(Duration::from_millis(400)).await;
    assert_eq!(manager.channel_count(), 1, "still within grace period");

    // Late joiner inside the grace period still sees the terminal event
    let (late, late_sub) = recorder();
    let late_subscription = manager.subscribe(IMPORT_ID, late_sub);
    assert!(!late_subscription.is_active());
    assert_eq!(
        snapshot(&late),
        vec![ProgressEvent::error("GitHub API unavailable")]
    );

    advance(Duration::from_millis(200)).await;
    assert_eq!(manager.channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_channel_removed_after_max_age() {
    let manager = ProgressStreamManager::new(test_config());
    manager.publish(IMPORT_ID, ProgressEvent::step("stalled", 1, 9));

    advance(Duration::from_secs(59)).await;
    assert_eq!(manager.channel_count(), 1);

    advance(Duration::from_secs(2)).await;
    assert_eq!(manager.channel_count(), 0);

    // Starts over: no stale buffer
    let (seen, subscriber) = recorder();
    let _subscription = manager.subscribe(IMPORT_ID, subscriber);
    assert!(snapshot(&seen).is_empty());
    assert_eq!(manager.buffered_len(IMPORT_ID), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_grace_timer_does_not_remove_recreated_channel() {
    let manager = ProgressStreamManager::new(test_config());
    manager.publish(IMPORT_ID, ProgressEvent::done("first"));

    // Torn down early, then recreated by a new import with the same id
    manager.remove(IMPORT_ID);
    manager.publish(IMPORT_ID, ProgressEvent::step("second run", 1, 3));

    advance(Duration::from_secs(1)).await;
    assert_eq!(manager.channel_count(), 1, "old grace timer must not fire");
    assert!(!manager.is_closed(IMPORT_ID));
    assert_eq!(manager.buffered_len(IMPORT_ID), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removal_drops_lingering_subscribers() {
    let manager = ProgressStreamManager::new(test_config());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let _subscription = manager.subscribe(
        IMPORT_ID,
        Box::new(move |event: &ProgressEvent| {
            let _ = tx.send(event.clone());
        }),
    );

    manager.publish(IMPORT_ID, ProgressEvent::done("r"));
    assert_eq!(rx.recv().await, Some(ProgressEvent::done("r")));

    advance(Duration::from_secs(1)).await;
    assert_eq!(rx.recv().await, None, "sender dropped with the channel");
}
