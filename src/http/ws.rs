use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use tracing::debug;
use tracing::warn;
use warp::ws::Message;
use warp::ws::WebSocket;
use warp::ws::Ws;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::with_service;
use crate::BroadcastHub;
use crate::ConfigService;
use crate::OutboundConnection;
use crate::PushConnection;

pub(super) fn route(
    service: Arc<ConfigService>
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("v1" / "ws" / String / String)
        .and(warp::ws())
        .and(with_service(service))
        .map(|namespace: String, environment: String, ws: Ws, service: Arc<ConfigService>| {
            ws.on_upgrade(move |socket| session(socket, service, namespace, environment))
        })
}

/// One subscriber: a writer task drains the connection's queue into the
/// socket while this task answers pings until the peer goes away.
async fn session(
    socket: WebSocket,
    service: Arc<ConfigService>,
    namespace: String,
    environment: String,
) {
    let (mut sink, mut stream) = socket.split();
    let hub_config = &service.settings().hub;
    let (conn, mut outbound) = OutboundConnection::new(hub_config.outbound_buffer, hub_config.send_timeout());
    let conn = Arc::new(conn);
    let id = conn.id();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sink.send(Message::text(text)).await {
                debug!(connection = id, error = %e, "Push socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    if let Err(e) = service.hub().connect(conn.clone(), &namespace, &environment).await {
        warn!(connection = id, namespace, environment, error = %e, "Push client rejected");
        writer.abort();
        return;
    }

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                debug!(connection = id, error = %e, "Push socket read failed");
                break;
            }
        };
        if message.is_close() {
            break;
        }
        let Some(reply) = message.to_str().ok().and_then(BroadcastHub::handle_inbound) else {
            continue;
        };
        if let Err(e) = conn.send(&reply).await {
            debug!(connection = id, error = %e, "Failed to answer push client");
            break;
        }
    }

    service.hub().disconnect(id);
    writer.abort();
}
