use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tracing::error;
use tracing::warn;
use warp::path::Tail;
use warp::Rejection;
use warp::Reply;

use super::rejection::ApiError;
use crate::metrics;
use crate::metrics::record_request;
use crate::metrics::REQUEST_DURATION;
use crate::ConfigEntry;
use crate::ConfigMetadata;
use crate::ConfigService;
use crate::DeployRequest;
use crate::WriteRequest;

const SINGLE_CONFIG: &str = "single_config";
const ALL_CONFIG: &str = "all_config";
const DELETE_CONFIG: &str = "delete_config";
const EMERGENCY: &str = "emergency";
const DEPLOY: &str = "deploy";

const NOT_FOUND: &str = "Configuration not found";
const RETRIEVE_FAILED: &str = "Failed to retrieve configuration";
const WRITE_FAILED: &str = "Failed to write configuration";
const DELETE_FAILED: &str = "Failed to delete configuration";
const UNHEALTHY: &str = "Service unhealthy";

#[derive(Debug, Serialize)]
struct ConfigResponse<'a> {
    key: &'a str,
    value: Value,
    version: String,
    metadata: ConfigMetadata,
}

#[derive(Debug, Serialize)]
struct ConfigBatchResponse {
    namespace: String,
    environment: String,
    configs: BTreeMap<String, ConfigEntry>,
}

#[derive(Debug, Serialize)]
struct DownSetResponse {
    down: Vec<String>,
}

/// Key from the path remainder; an empty remainder names no key
fn key_from(tail: &Tail) -> Result<&str, Rejection> {
    match tail.as_str().trim_end_matches('/') {
        "" => Err(warp::reject::not_found()),
        key => Ok(key),
    }
}

pub(super) async fn health(service: Arc<ConfigService>) -> Result<impl Reply, Rejection> {
    match service.health_check().await {
        Ok(()) => Ok(warp::reply::json(&json!({ "status": "healthy" }))),
        Err(e) => {
            error!(error = %e, "Health check failed");
            Err(warp::reject::custom(ApiError::unavailable(UNHEALTHY)))
        }
    }
}

pub(super) async fn metrics() -> Result<impl Reply, Rejection> {
    Ok(metrics::render())
}

pub(super) async fn get_all_configs(
    namespace: String,
    environment: String,
    service: Arc<ConfigService>,
) -> Result<impl Reply, Rejection> {
    record_request("GET", ALL_CONFIG, "attempt");
    let timer = REQUEST_DURATION.with_label_values(&[ALL_CONFIG]).start_timer();
    let result = service.get_all_configs(&namespace, &environment).await;
    timer.observe_duration();

    match result {
        Ok(configs) => {
            record_request("GET", ALL_CONFIG, "success");
            Ok(warp::reply::json(&ConfigBatchResponse {
                namespace,
                environment,
                configs,
            }))
        }
        Err(e) => {
            record_request("GET", ALL_CONFIG, "error");
            error!(namespace, environment, error = %e, "Failed to get all configs");
            Err(warp::reject::custom(ApiError::from_error(&e, RETRIEVE_FAILED)))
        }
    }
}

pub(super) async fn get_config(
    namespace: String,
    environment: String,
    tail: Tail,
    service: Arc<ConfigService>,
) -> Result<impl Reply, Rejection> {
    let key = key_from(&tail)?;
    record_request("GET", SINGLE_CONFIG, "attempt");
    let timer = REQUEST_DURATION.with_label_values(&[SINGLE_CONFIG]).start_timer();
    let result = service.get_config(&namespace, &environment, key).await;
    timer.observe_duration();

    match result {
        Ok(Some(entry)) => {
            record_request("GET", SINGLE_CONFIG, "success");
            Ok(warp::reply::json(&ConfigResponse {
                key,
                value: entry.value,
                version: entry.version,
                metadata: entry.metadata,
            }))
        }
        Ok(None) => {
            record_request("GET", SINGLE_CONFIG, "not_found");
            Err(warp::reject::custom(ApiError::not_found(NOT_FOUND)))
        }
        Err(e) => {
            record_request("GET", SINGLE_CONFIG, "error");
            error!(namespace, environment, key, error = %e, "Failed to get config");
            Err(warp::reject::custom(ApiError::from_error(&e, RETRIEVE_FAILED)))
        }
    }
}

pub(super) async fn delete_config(
    namespace: String,
    environment: String,
    tail: Tail,
    service: Arc<ConfigService>,
) -> Result<impl Reply, Rejection> {
    let key = key_from(&tail)?;
    record_request("DELETE", DELETE_CONFIG, "attempt");

    match service.delete_config(&namespace, &environment, key).await {
        Ok(deleted) => {
            record_request("DELETE", DELETE_CONFIG, "success");
            Ok(warp::reply::json(&json!({ "deleted": deleted })))
        }
        Err(e) => {
            record_request("DELETE", DELETE_CONFIG, "error");
            error!(namespace, environment, key, error = %e, "Failed to delete config");
            Err(warp::reject::custom(ApiError::from_error(&e, DELETE_FAILED)))
        }
    }
}

pub(super) async fn write_config(
    namespace: String,
    environment: String,
    tail: Tail,
    request: WriteRequest,
    service: Arc<ConfigService>,
) -> Result<impl Reply, Rejection> {
    let key = key_from(&tail)?;
    record_request("POST", EMERGENCY, "attempt");
    let timer = REQUEST_DURATION.with_label_values(&[EMERGENCY]).start_timer();
    let result = service.write_config(&namespace, &environment, key, request).await;
    timer.observe_duration();

    match result {
        Ok(response) => {
            record_request("POST", EMERGENCY, "success");
            let lagging = response.replication_log.iter().filter(|r| !r.ok).count();
            if lagging > 0 {
                warn!(namespace, environment, key, lagging, "Write not observed on every endpoint");
            }
            Ok(warp::reply::json(&response))
        }
        Err(e) => {
            record_request("POST", EMERGENCY, "error");
            error!(namespace, environment, key, error = %e, "Emergency write failed");
            Err(warp::reject::custom(ApiError::from_error(&e, WRITE_FAILED)))
        }
    }
}

pub(super) async fn deploy(
    namespace: String,
    environment: String,
    request: DeployRequest,
    service: Arc<ConfigService>,
) -> Result<impl Reply, Rejection> {
    record_request("POST", DEPLOY, "attempt");

    match service.deploy(&namespace, &environment, request).await {
        Ok(response) => {
            record_request("POST", DEPLOY, "success");
            Ok(warp::reply::json(&response))
        }
        Err(e) => {
            record_request("POST", DEPLOY, "error");
            error!(namespace, environment, error = %e, "Deploy failed");
            Err(warp::reject::custom(ApiError::from_error(&e, WRITE_FAILED)))
        }
    }
}

pub(super) async fn cluster_status(service: Arc<ConfigService>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&service.cluster_status().await))
}

pub(super) async fn kill_leader(service: Arc<ConfigService>) -> Result<impl Reply, Rejection> {
    match service.kill_leader().await {
        Ok(down) => Ok(warp::reply::json(&DownSetResponse { down })),
        Err(e) => Err(warp::reject::custom(ApiError::from_error(&e, "Failed to kill leader"))),
    }
}

pub(super) async fn revive(service: Arc<ConfigService>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&DownSetResponse {
        down: service.revive(),
    }))
}
