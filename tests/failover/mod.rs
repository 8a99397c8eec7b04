//! Node loss, simulated and real, as seen by reads, writes and the
//! convergence report.

use std::time::Duration;

use confwatch::ClusterError;
use confwatch::Error;
use confwatch::WriteRequest;
use confwatch::SIMULATED_DOWN;
use serde_json::json;

use crate::common::cluster;
use crate::common::start_service;
use crate::common::LABELS;
use crate::common::REPLICATION_TIMEOUT_MS;

#[tokio::test]
async fn test_writes_survive_losing_the_connected_node() {
    let cluster = cluster();
    let service = start_service(&cluster).await;
    service
        .write_config("svc", "prod", "before", WriteRequest::new(json!(1)))
        .await
        .unwrap();

    cluster.set_up(LABELS[0], false);

    let response = service
        .write_config("svc", "prod", "after", WriteRequest::new(json!(2)))
        .await
        .expect("write fails over to a live node");
    let entry = service.get_config("svc", "prod", "after").await.unwrap().unwrap();
    assert_eq!(entry.version, response.version);

    let log = &response.replication_log;
    assert!(!log[0].ok, "stopped node cannot confirm the write");
    assert!(log[1].ok && log[2].ok);
}

#[tokio::test]
async fn test_lagging_node_is_reported_without_failing_the_write() {
    let cluster = cluster();
    cluster.set_lag(LABELS[2], Duration::from_millis(REPLICATION_TIMEOUT_MS * 3));
    let service = start_service(&cluster).await;

    let response = service
        .write_config("svc", "prod", "slow", WriteRequest::new(json!("x")))
        .await
        .unwrap();

    assert!(response.success);
    let lagging = &response.replication_log[2];
    assert_eq!(lagging.endpoint, LABELS[2]);
    assert!(!lagging.ok);
    assert!(lagging.elapsed_ms >= REPLICATION_TIMEOUT_MS as f64);
    assert!(lagging.error.as_deref().unwrap_or_default().contains("not observed"));
}

#[tokio::test]
async fn test_kill_leader_walks_the_cluster_then_revive_restores_it() {
    let cluster = cluster();
    let service = start_service(&cluster).await;

    let mut killed = Vec::new();
    for _ in 0..LABELS.len() {
        let status = service.cluster_status().await;
        let leader = status.leader().map(|m| m.endpoint.clone());
        let down = service.kill_leader().await.unwrap();
        killed.push(leader);
        assert_eq!(down.len(), killed.len());
    }
    assert_eq!(
        killed,
        LABELS.iter().map(|l| Some(l.to_string())).collect::<Vec<_>>()
    );

    let status = service.cluster_status().await;
    assert!(status.leader_id.is_none());
    assert!(status.members.iter().all(|m| !m.healthy));
    assert!(matches!(
        service.kill_leader().await,
        Err(Error::Cluster(ClusterError::NoHealthyMembers))
    ));

    // Simulated loss never touches the backend
    service
        .write_config("svc", "prod", "k", WriteRequest::new(json!(1)))
        .await
        .unwrap();

    service.revive();
    let status = service.cluster_status().await;
    assert!(status.members.iter().all(|m| m.healthy));
    assert_eq!(status.leader().map(|m| m.endpoint.as_str()), Some(LABELS[0]));
}

#[tokio::test]
async fn test_simulated_down_nodes_are_not_polled() {
    let cluster = cluster();
    let service = start_service(&cluster).await;
    service.kill_leader().await.unwrap();

    let response = service
        .write_config("svc", "prod", "k", WriteRequest::new(json!({"a": 1})))
        .await
        .unwrap();

    let first = &response.replication_log[0];
    assert_eq!(first.endpoint, LABELS[0]);
    assert_eq!(first.elapsed_ms, 0.0);
    assert_eq!(first.error.as_deref(), Some(SIMULATED_DOWN));
    // The backend itself still holds the value everywhere
    assert!(cluster.value_at(LABELS[0], "/config/svc/prod/k").is_some());
}
