//! HTTP and WebSocket surface over [`ConfigService`].
//!
//! | Method | Path |
//! |---|---|
//! | GET | `/health`, `/metrics` |
//! | GET | `/v1/config/{ns}/{env}` |
//! | GET, DELETE | `/v1/config/{ns}/{env}/{key..}` |
//! | POST | `/v1/emergency/{ns}/{env}/{key..}` |
//! | POST | `/v1/deploy/{ns}/{env}` |
//! | GET | `/v1/cluster/status` |
//! | POST | `/v1/cluster/kill-leader`, `/v1/cluster/revive` |
//! | WS | `/v1/ws/{ns}/{env}` |
//!
//! Errors are returned as `{"detail": "..."}`.

mod handlers;
mod rejection;
mod ws;

#[cfg(test)]
mod http_test;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use warp::Filter;
use warp::Reply;

use crate::ConfigService;
use crate::Result;
use crate::SystemError;

/// Largest accepted JSON request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Every route, with rejections rendered as JSON
pub fn routes(
    service: Arc<ConfigService>
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::health);

    let metrics = warp::path!("metrics").and(warp::get()).and_then(handlers::metrics);

    let list_configs = warp::path!("v1" / "config" / String / String)
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::get_all_configs);

    let get_config = warp::path!("v1" / "config" / String / String / ..)
        .and(warp::path::tail())
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::get_config);

    let delete_config = warp::path!("v1" / "config" / String / String / ..)
        .and(warp::path::tail())
        .and(warp::delete())
        .and(with_service(service.clone()))
        .and_then(handlers::delete_config);

    let emergency = warp::path!("v1" / "emergency" / String / String / ..)
        .and(warp::path::tail())
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(handlers::write_config);

    let deploy = warp::path!("v1" / "deploy" / String / String)
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(handlers::deploy);

    let cluster_status = warp::path!("v1" / "cluster" / "status")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::cluster_status);

    let kill_leader = warp::path!("v1" / "cluster" / "kill-leader")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(handlers::kill_leader);

    let revive = warp::path!("v1" / "cluster" / "revive")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(handlers::revive);

    health
        .or(metrics)
        .or(list_configs)
        .or(get_config)
        .or(delete_config)
        .or(emergency)
        .or(deploy)
        .or(cluster_status)
        .or(kill_leader)
        .or(revive)
        .or(ws::route(service))
        .recover(rejection::handle_rejection)
        .with(warp::trace::request())
}

/// Bind `address` and serve until `shutdown` resolves
pub async fn serve(
    service: Arc<ConfigService>,
    address: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let (bound, server) = warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(address, shutdown)
        .map_err(|e| SystemError::Bind {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    info!(address = %bound, "HTTP server listening");
    server.await;
    info!("HTTP server stopped");
    Ok(())
}

fn with_service(
    service: Arc<ConfigService>
) -> impl Filter<Extract = (Arc<ConfigService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}
