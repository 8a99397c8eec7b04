use std::sync::Arc;

use serde_json::json;
use serde_json::Value;

use super::routes;
use crate::test_utils::three_node_cluster;
use crate::test_utils::LABELS;
use crate::ConfigService;
use crate::MemCluster;
use crate::Settings;

async fn service_for(cluster: &MemCluster) -> Arc<ConfigService> {
    let mut settings = Settings::default();
    settings.store.endpoints = LABELS.iter().map(|l| l.to_string()).collect();
    settings.store.request_timeout_ms = 500;
    settings.replication.timeout_ms = 300;
    settings.replication.interval_ms = 10;
    ConfigService::start(settings, Arc::new(cluster.clone()))
        .await
        .expect("service starts")
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn test_health_reports_store_reachability() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(res.status(), 200);
    assert_eq!(body_json(res.body()), json!({"status": "healthy"}));

    for label in LABELS {
        cluster.set_up(label, false);
    }
    let res = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(res.status(), 503);
    assert_eq!(body_json(res.body()), json!({"detail": "Service unhealthy"}));
}

#[tokio::test]
async fn test_missing_config_is_404() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request()
        .path("/v1/config/svc/prod/absent")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 404);
    assert_eq!(body_json(res.body()), json!({"detail": "Configuration not found"}));
}

#[tokio::test]
async fn test_emergency_write_then_get() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request()
        .method("POST")
        .path("/v1/emergency/svc/prod/feature/flag")
        .json(&json!({"value": {"enabled": true}, "reason": "incident"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    let written = body_json(res.body());
    assert_eq!(written["success"], json!(true));
    assert_eq!(written["replication_log"].as_array().map(|l| l.len()), Some(3));
    assert_eq!(written["replication_context"]["key"], json!("feature/flag"));

    let res = warp::test::request()
        .path("/v1/config/svc/prod/feature/flag")
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    let read = body_json(res.body());
    assert_eq!(read["key"], json!("feature/flag"));
    assert_eq!(read["value"], json!({"enabled": true}));
    assert_eq!(read["version"], written["version"]);
    assert_eq!(read["metadata"]["created_by"], json!("api"));
}

#[tokio::test]
async fn test_write_without_value_is_rejected() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request()
        .method("POST")
        .path("/v1/emergency/svc/prod/k")
        .json(&json!({"reason": "no value"}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), 422);
}

#[tokio::test]
async fn test_deploy_list_and_delete() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request()
        .method("POST")
        .path("/v1/deploy/svc/prod")
        .json(&json!({"git_ref": "abc123", "created_by": "ci", "configs": {"a": 1, "b": "two"}}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(
        body_json(res.body()),
        json!({"success": true, "deployed": 2, "git_ref": "abc123"})
    );

    let res = warp::test::request().path("/v1/config/svc/prod").reply(&api).await;
    assert_eq!(res.status(), 200);
    let listing = body_json(res.body());
    assert_eq!(listing["namespace"], json!("svc"));
    assert_eq!(listing["configs"]["b"]["value"], json!("two"));
    assert_eq!(listing["configs"]["a"]["metadata"]["git_commit"], json!("abc123"));

    let res = warp::test::request()
        .method("DELETE")
        .path("/v1/config/svc/prod/a")
        .reply(&api)
        .await;
    assert_eq!(body_json(res.body()), json!({"deleted": true}));
}

#[tokio::test]
async fn test_cluster_routes() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request().path("/v1/cluster/status").reply(&api).await;
    let status = body_json(res.body());
    assert_eq!(status["leader_id"], json!("1"));
    assert_eq!(status["members"].as_array().map(|m| m.len()), Some(3));

    let res = warp::test::request()
        .method("POST")
        .path("/v1/cluster/kill-leader")
        .reply(&api)
        .await;
    assert_eq!(body_json(res.body()), json!({"down": ["a:2379"]}));

    let res = warp::test::request().path("/v1/cluster/status").reply(&api).await;
    assert_eq!(body_json(res.body())["leader_id"], json!("2"));

    let res = warp::test::request()
        .method("POST")
        .path("/v1/cluster/revive")
        .reply(&api)
        .await;
    assert_eq!(body_json(res.body()), json!({"down": []}));
}

#[tokio::test]
async fn test_kill_leader_with_everyone_down_is_409() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    for _ in 0..3 {
        warp::test::request()
            .method("POST")
            .path("/v1/cluster/kill-leader")
            .reply(&api)
            .await;
    }
    let res = warp::test::request()
        .method("POST")
        .path("/v1/cluster/kill-leader")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn test_metrics_exposes_request_counter() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);
    warp::test::request().path("/v1/config/svc/prod/x").reply(&api).await;

    let res = warp::test::request().path("/metrics").reply(&api).await;

    assert_eq!(res.status(), 200);
    let body = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(body.contains("config_requests_total"));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let res = warp::test::request().path("/v2/nothing").reply(&api).await;

    assert_eq!(res.status(), 404);
    assert_eq!(body_json(res.body()), json!({"detail": "Not Found"}));
}

#[tokio::test]
async fn test_websocket_greets_and_answers_ping() {
    let cluster = three_node_cluster();
    let api = routes(service_for(&cluster).await);

    let mut client = warp::test::ws()
        .path("/v1/ws/svc/prod")
        .handshake(api)
        .await
        .expect("handshake");

    let greeting = client.recv().await.expect("greeting");
    let greeting: Value = serde_json::from_str(greeting.to_str().unwrap()).unwrap();
    assert_eq!(greeting["type"], json!("connected"));
    assert_eq!(greeting["namespace"], json!("svc"));

    client.send_text(r#"{"type":"ping"}"#).await;
    let pong = client.recv().await.expect("pong");
    assert_eq!(pong.to_str().unwrap(), r#"{"type":"pong"}"#);
}
