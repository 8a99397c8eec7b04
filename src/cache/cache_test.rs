use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::test_utils::entry;

fn put(
    path: &str,
    version: &str,
) -> WatchEvent {
    WatchEvent::Put {
        key: path.to_string(),
        entry: Some(entry(json!(version), version)),
    }
}

#[tokio::test]
async fn put_event_populates_and_overwrites() {
    let cache = RealtimeCache::new();

    cache.on_event(&put("/config/svc/prod/k", "v1")).await.unwrap();
    cache.on_event(&put("/config/svc/prod/k", "v2")).await.unwrap();

    assert_eq!(cache.get("svc", "prod", "k").unwrap().version, "v2");
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn delete_event_removes_entry() {
    let cache = RealtimeCache::new();
    cache.on_event(&put("/config/svc/prod/k", "v1")).await.unwrap();

    cache
        .on_event(&WatchEvent::Delete {
            key: "/config/svc/prod/k".into(),
        })
        .await
        .unwrap();

    assert!(cache.get("svc", "prod", "k").is_none());
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn undecodable_put_fences_stale_backfill() {
    let cache = RealtimeCache::new();
    cache.on_event(&put("/config/svc/prod/k", "v1")).await.unwrap();
    tokio::time::advance(Duration::from_millis(5)).await;

    // A store read that saw v1 is in flight when an undecodable value lands
    let read_started = Instant::now();
    tokio::time::advance(Duration::from_millis(5)).await;
    cache
        .on_event(&WatchEvent::Put {
            key: "/config/svc/prod/k".into(),
            entry: None,
        })
        .await
        .unwrap();

    assert!(!cache.backfill("svc", "prod", "k", entry(json!(1), "v1"), read_started));
    assert!(cache.get("svc", "prod", "k").is_none());

    tokio::time::advance(Duration::from_millis(5)).await;
    assert!(cache.backfill("svc", "prod", "k", entry(json!(3), "v3"), Instant::now()));
    assert_eq!(cache.get("svc", "prod", "k").unwrap().version, "v3");
}

#[tokio::test]
async fn events_outside_config_root_are_ignored() {
    let cache = RealtimeCache::new();

    cache.on_event(&put("/other/svc/prod/k", "v1")).await.unwrap();

    assert!(cache.is_empty());
}

#[tokio::test]
async fn get_all_strips_prefix_and_filters_by_environment() {
    let cache = RealtimeCache::new();
    cache.on_event(&put("/config/svc/prod/a", "v1")).await.unwrap();
    cache.on_event(&put("/config/svc/prod/nested/b", "v1")).await.unwrap();
    cache.on_event(&put("/config/svc/staging/c", "v1")).await.unwrap();
    cache.on_event(&put("/config/svc/production/d", "v1")).await.unwrap();

    let all = cache.get_all("svc", "prod");

    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "nested/b"]);
    assert!(cache.get_all("empty", "dev").is_empty());
}

#[tokio::test]
async fn backfill_fills_empty_slot() {
    let cache = RealtimeCache::new();

    assert!(cache.backfill("svc", "prod", "k", entry(json!(1), "v1"), Instant::now()));
    assert_eq!(cache.get("svc", "prod", "k").unwrap().version, "v1");
}

#[tokio::test(start_paused = true)]
async fn backfill_never_replaces_newer_watch_update() {
    let cache = RealtimeCache::new();
    let read_started = Instant::now();
    tokio::time::advance(Duration::from_millis(5)).await;

    // Watch delivers v2 while the store read (which saw v1) is in flight
    cache.on_event(&put("/config/svc/prod/k", "v2")).await.unwrap();

    assert!(!cache.backfill("svc", "prod", "k", entry(json!(1), "v1"), read_started));
    assert_eq!(cache.get("svc", "prod", "k").unwrap().version, "v2");
}

#[tokio::test(start_paused = true)]
async fn backfill_cannot_resurrect_deleted_key() {
    let cache = RealtimeCache::new();
    let read_started = Instant::now();
    tokio::time::advance(Duration::from_millis(5)).await;

    cache
        .on_event(&WatchEvent::Delete {
            key: "/config/svc/prod/k".into(),
        })
        .await
        .unwrap();

    assert!(!cache.backfill("svc", "prod", "k", entry(json!(1), "v1"), read_started));
    assert!(cache.get("svc", "prod", "k").is_none());
}

#[tokio::test(start_paused = true)]
async fn backfill_replaces_slot_observed_before_read() {
    let cache = RealtimeCache::new();
    cache.on_event(&put("/config/svc/prod/k", "v1")).await.unwrap();
    tokio::time::advance(Duration::from_millis(5)).await;

    let read_started = Instant::now();
    assert!(cache.backfill("svc", "prod", "k", entry(json!(2), "v2"), read_started));
    assert_eq!(cache.get("svc", "prod", "k").unwrap().version, "v2");
}

#[tokio::test(start_paused = true)]
async fn delete_churn_reclaims_expired_tombstones() {
    let cache = RealtimeCache::with_tombstone_ttl(Duration::from_secs(1));

    for i in 0..1000 {
        let path = format!("/config/svc/prod/k{i}");
        cache.on_event(&put(&path, "v1")).await.unwrap();
        cache.on_event(&WatchEvent::Delete { key: path }).await.unwrap();
    }
    assert_eq!(cache.slot_count(), 1000);

    tokio::time::advance(Duration::from_secs(2)).await;
    for i in 0..PRUNE_EVERY {
        cache
            .on_event(&WatchEvent::Delete {
                key: format!("/config/svc/prod/late{i}"),
            })
            .await
            .unwrap();
    }

    assert!(cache.slot_count() <= PRUNE_EVERY);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn prune_keeps_fresh_tombstones_and_entries() {
    let cache = RealtimeCache::with_tombstone_ttl(Duration::from_secs(1));
    cache.on_event(&put("/config/svc/prod/live", "v1")).await.unwrap();
    cache
        .on_event(&WatchEvent::Delete {
            key: "/config/svc/prod/old".into(),
        })
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let read_started = Instant::now();
    tokio::time::advance(Duration::from_millis(5)).await;
    cache
        .on_event(&WatchEvent::Delete {
            key: "/config/svc/prod/fresh".into(),
        })
        .await
        .unwrap();

    assert_eq!(cache.prune_tombstones(), 1);
    assert_eq!(cache.slot_count(), 2);
    assert_eq!(cache.get("svc", "prod", "live").unwrap().version, "v1");
    assert!(!cache.backfill("svc", "prod", "fresh", entry(json!(1), "v1"), read_started));
}

#[test]
fn loaded_marker_is_per_namespace_environment() {
    let cache = RealtimeCache::new();
    assert!(!cache.is_loaded("svc", "prod"));

    cache.mark_loaded("svc", "prod");

    assert!(cache.is_loaded("svc", "prod"));
    assert!(!cache.is_loaded("svc", "staging"));
}
