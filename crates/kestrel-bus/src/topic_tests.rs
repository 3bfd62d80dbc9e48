// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    n: u32,
}

#[tokio::test]
async fn publish_then_get_observes_value() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);
    topic.publish("k1", Widget { n: 1 }).await.unwrap();
    assert_eq!(topic.get("k1").await, Some(Widget { n: 1 }));
}

#[tokio::test]
async fn duplicate_publish_produces_no_modify() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);
    topic.signal_restarted();
    let mut sub = topic.subscribe().await;
    topic.publish("k1", Widget { n: 1 }).await.unwrap();
    topic.publish("k1", Widget { n: 1 }).await.unwrap();
    topic.unpublish("k1").await.unwrap();

    // initial empty snapshot
    assert!(matches!(sub.next().await, Some(ChangeEvent::Sync)));
    assert!(matches!(sub.next().await, Some(ChangeEvent::Create { .. })));
    // the duplicate publish must not appear as a Modify before Delete
    assert!(matches!(sub.next().await, Some(ChangeEvent::Delete { .. })));
}

#[tokio::test]
async fn subscribe_before_publish_sees_creates_strictly_before_sync() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);
    topic.signal_restarted();
    topic.publish("a", Widget { n: 1 }).await.unwrap();
    topic.publish("b", Widget { n: 2 }).await.unwrap();
    let mut sub = topic.subscribe().await;

    let mut creates = 0;
    loop {
        match sub.next().await {
            Some(ChangeEvent::Create { .. }) => creates += 1,
            Some(ChangeEvent::Sync) => break,
            other => panic!("unexpected event before sync: {other:?}"),
        }
    }
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn subscribe_before_restart_signal_sees_creates_strictly_before_sync() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);

    // The subscriber attaches while the publisher is still mid-replay (it
    // has not signaled restarted yet): the Sync must be withheld until
    // that signal actually arrives, not handed out immediately.
    let mut sub = topic.subscribe().await;
    topic.publish("a", Widget { n: 1 }).await.unwrap();
    topic.publish("b", Widget { n: 2 }).await.unwrap();
    topic.signal_restarted();

    let mut creates = 0;
    let mut syncs = 0;
    for _ in 0..3 {
        match sub.next().await {
            Some(ChangeEvent::Create { .. }) => {
                assert_eq!(syncs, 0, "all creates must be delivered before sync");
                creates += 1;
            }
            Some(ChangeEvent::Sync) => syncs += 1,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(creates, 2);
    assert_eq!(syncs, 1);
}

#[tokio::test]
async fn reload_from_disk_observes_writes_made_by_another_handle() {
    let dir = tempfile::tempdir().unwrap();
    let owner: Arc<TopicStore<Widget>> = TopicStore::new(Some(dir.path().to_path_buf()));
    owner.load_persisted().await.unwrap();
    owner.signal_restarted();

    // A second handle over the same directory stands in for the same
    // subcommand running as a separate OS process.
    let reader: Arc<TopicStore<Widget>> = TopicStore::new(Some(dir.path().to_path_buf()));
    reader.load_persisted().await.unwrap();
    reader.signal_restarted();
    let mut sub = reader.subscribe().await;
    assert!(matches!(sub.next().await, Some(ChangeEvent::Sync)));

    owner.publish("k1", Widget { n: 1 }).await.unwrap();
    reader.reload_from_disk().await.unwrap();
    assert!(matches!(sub.next().await, Some(ChangeEvent::Create { key, .. }) if key == "k1"));

    owner.unpublish("k1").await.unwrap();
    reader.reload_from_disk().await.unwrap();
    assert!(matches!(sub.next().await, Some(ChangeEvent::Delete { key, .. }) if key == "k1"));
}

#[tokio::test]
async fn restart_signal_observed_exactly_once() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);
    assert!(!topic.restarted());
    topic.signal_restarted();
    assert!(topic.restarted());
}

#[tokio::test]
async fn modify_after_create_is_observed() {
    let topic: Arc<TopicStore<Widget>> = TopicStore::new(None);
    topic.signal_restarted();
    let mut sub = topic.subscribe().await;
    topic.publish("k1", Widget { n: 1 }).await.unwrap();
    topic.publish("k1", Widget { n: 2 }).await.unwrap();

    assert!(matches!(sub.next().await, Some(ChangeEvent::Sync)));
    assert!(matches!(sub.next().await, Some(ChangeEvent::Create { .. })));
    assert!(matches!(sub.next().await, Some(ChangeEvent::Modify { new: Widget { n: 2 }, .. })));
}
