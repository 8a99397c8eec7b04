//! Routes driven end to end against a simulated cluster.

use serde_json::json;
use serde_json::Value;

use confwatch::http::routes;

use crate::common::cluster;
use crate::common::start_service;
use crate::common::LABELS;

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn test_emergency_write_is_pushed_over_websocket() {
    let cluster = cluster();
    let api = routes(start_service(&cluster).await);

    let mut client = warp::test::ws()
        .path("/v1/ws/checkout/prod")
        .handshake(api.clone())
        .await
        .expect("handshake");
    let greeting: Value = serde_json::from_str(client.recv().await.unwrap().to_str().unwrap()).unwrap();
    assert_eq!(greeting["type"], json!("connected"));

    let res = warp::test::request()
        .method("POST")
        .path("/v1/emergency/checkout/prod/timeouts/db")
        .json(&json!({"value": 250, "created_by": "oncall"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    let version = body_json(res.body())["version"].clone();

    let pushed: Value = serde_json::from_str(client.recv().await.unwrap().to_str().unwrap()).unwrap();
    assert_eq!(pushed["type"], json!("config_change"));
    assert_eq!(pushed["key"], json!("timeouts/db"));
    assert_eq!(pushed["value"], json!(250));
    assert_eq!(pushed["version"], version);
    assert_eq!(pushed["metadata"]["created_by"], json!("oncall"));

    let res = warp::test::request()
        .method("DELETE")
        .path("/v1/config/checkout/prod/timeouts/db")
        .reply(&api)
        .await;
    assert_eq!(body_json(res.body()), json!({"deleted": true}));

    let pushed: Value = serde_json::from_str(client.recv().await.unwrap().to_str().unwrap()).unwrap();
    assert_eq!(
        pushed,
        json!({"type": "config_delete", "namespace": "checkout", "environment": "prod", "key": "timeouts/db"})
    );
}

#[tokio::test]
async fn test_store_outage_maps_to_503() {
    let cluster = cluster();
    let api = routes(start_service(&cluster).await);
    for label in LABELS {
        cluster.set_up(label, false);
    }

    let res = warp::test::request()
        .path("/v1/config/checkout/prod/anything")
        .reply(&api)
        .await;

    assert_eq!(res.status(), 503);
    assert!(body_json(res.body())["detail"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_status_reflects_kill_and_revive() {
    let cluster = cluster();
    let api = routes(start_service(&cluster).await);

    warp::test::request()
        .method("POST")
        .path("/v1/cluster/kill-leader")
        .reply(&api)
        .await;
    let status = body_json(
        warp::test::request()
            .path("/v1/cluster/status")
            .reply(&api)
            .await
            .body(),
    );
    let members = status["members"].as_array().unwrap();
    assert_eq!(members[0]["healthy"], json!(false));
    assert_eq!(members[1]["is_leader"], json!(true));

    let res = warp::test::request()
        .method("POST")
        .path("/v1/cluster/revive")
        .reply(&api)
        .await;
    assert_eq!(body_json(res.body()), json!({"down": []}));
}
