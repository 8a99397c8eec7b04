//! Store changes reaching the cache, watch callbacks and push subscribers.

use std::sync::Arc;
use std::time::Duration;

use confwatch::BroadcastHub;
use confwatch::ConfigEntry;
use confwatch::FnCallback;
use confwatch::PushMessage;
use confwatch::WatchDispatcher;
use confwatch::WatchEvent;
use confwatch::WriteRequest;
use parking_lot::Mutex;
use serde_json::json;

use crate::common::cluster;
use crate::common::enable_logger;
use crate::common::settings;
use crate::common::start_service;
use crate::common::wait_until;

#[tokio::test]
async fn test_cache_follows_writes_and_deletes() {
    let cluster = cluster();
    let service = start_service(&cluster).await;

    for round in 0..3 {
        service
            .write_config("payments", "prod", "limit", WriteRequest::new(json!(round)))
            .await
            .unwrap();
    }

    let cache = service.cache().clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let cache = cache.clone();
            async move { cache.get("payments", "prod", "limit").map(|e| e.value) == Some(json!(2)) }
        })
        .await,
        "cache never saw the last write"
    );

    assert!(service.delete_config("payments", "prod", "limit").await.unwrap());
    assert!(
        wait_until(Duration::from_secs(2), || {
            let cache = cache.clone();
            async move { cache.get("payments", "prod", "limit").is_none() }
        })
        .await
    );
    assert!(service.get_config("payments", "prod", "limit").await.unwrap().is_none());
}

#[tokio::test]
async fn test_watchers_see_events_in_commit_order() {
    enable_logger();
    let cluster = cluster();
    let gateway = Arc::new(
        confwatch::StoreGateway::from_config(&settings().store, Arc::new(cluster.clone())).unwrap(),
    );
    gateway.connect().await.unwrap();
    let dispatcher = WatchDispatcher::new(gateway.clone(), settings().watch);
    dispatcher.start();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    dispatcher
        .watch(
            "/config/svc/",
            Arc::new(FnCallback(move |event: &WatchEvent| -> confwatch::Result<()> {
                let label = match event {
                    WatchEvent::Put { key, .. } => format!("put {key}"),
                    WatchEvent::Delete { key } => format!("delete {key}"),
                };
                sink.lock().push(label);
                Ok(())
            })),
        )
        .await
        .unwrap();

    let entry = |v: i64| ConfigEntry::new(json!(v), format!("v{v}"), "it", chrono::Utc::now());
    gateway.put("svc", "prod", "a", &entry(1)).await.unwrap();
    gateway.put("svc", "prod", "b", &entry(2)).await.unwrap();
    gateway.delete("svc", "prod", "a").await.unwrap();
    // Outside the watched prefix
    gateway.put("other", "prod", "a", &entry(3)).await.unwrap();

    let probe = seen.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let probe = probe.clone();
            async move { probe.lock().len() >= 3 }
        })
        .await
    );
    assert_eq!(
        *seen.lock(),
        vec![
            "put /config/svc/prod/a".to_string(),
            "put /config/svc/prod/b".to_string(),
            "delete /config/svc/prod/a".to_string(),
        ]
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_subscribers_only_get_their_channel() {
    let cluster = cluster();
    let service = start_service(&cluster).await;
    let hub: Arc<BroadcastHub> = service.hub().clone();

    let (prod, mut prod_rx) = confwatch::OutboundConnection::new(16, Duration::from_millis(200));
    let (staging, mut staging_rx) = confwatch::OutboundConnection::new(16, Duration::from_millis(200));
    hub.connect(Arc::new(prod), "svc", "prod").await.unwrap();
    hub.connect(Arc::new(staging), "svc", "staging").await.unwrap();
    // Greetings
    prod_rx.recv().await.unwrap();
    staging_rx.recv().await.unwrap();

    service
        .write_config("svc", "prod", "flag", WriteRequest::new(json!(true)))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), prod_rx.recv())
        .await
        .expect("prod subscriber notified")
        .unwrap();
    let message: PushMessage = serde_json::from_str(&frame).unwrap();
    assert!(matches!(message, PushMessage::ConfigChange { ref key, .. } if key == "flag"));
    assert!(staging_rx.try_recv().is_err());
}
