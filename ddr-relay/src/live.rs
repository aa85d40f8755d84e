use crate::{json_err, utils::now_secs, AppState};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, Utf8Bytes, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ddr_common::{
    core::PoseSnapshot,
    live::{ErrorKind, LiveEvent},
};
use futures::{stream::StreamExt, SinkExt};
use log::{debug, info, warn};
use serde_json::json;
use tokio::{sync::mpsc, time};

mod hub;
pub use hub::*;

mod session;
pub use session::Session;

pub fn encode_event(event: &LiveEvent) -> Result<Utf8Bytes> {
    serde_json::to_string(event)
        .map(Utf8Bytes::from)
        .context("failed to encode event")
}

/// `POST /api/cv/pose` from the vision pipeline.
pub async fn receive_pose(State(state): State<AppState>, Json(pose): Json<PoseSnapshot>) -> Response {
    let report = match state.hub.publish(pose, now_secs()).await {
        Ok(report) => report,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, json_err!("{e:#}")).into_response();
        }
    };
    for (id, e) in &report.failures {
        debug!("Pose update not delivered to {id}: {e}");
    }
    let pruned = report.pruned().count();
    if pruned > 0 || report.dropped() > 0 {
        info!(
            "Pose update delivered to {}, dropped for {}, pruned {} closed client(s)",
            report.delivered,
            report.dropped(),
            pruned
        );
    }
    Json(json!({"status": "ok"})).into_response()
}

pub async fn live_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

async fn handle_ws(state: AppState, socket: WebSocket) {
    let (event_tx, mut event_rx) = mpsc::channel::<Utf8Bytes>(state.config.subscriber_buffer);
    let subscriber = Subscriber::new(state.hub.next_id(), event_tx.clone());
    let id = subscriber.id;
    state.hub.subscribe(&subscriber).await;
    info!(
        "Client {id} connected (total: {})",
        state.hub.subscriber_count().await
    );

    let send_timeout = state.config.send_timeout();
    let mut session = Session::new(state.clone());
    let (mut ws_tx, mut ws_rx) = socket.split();

    tokio::select! {
        // Relay → Client: replies and pose updates, one bounded write at a time
        _ = async {
            while let Some(frame) = event_rx.recv().await {
                match time::timeout(send_timeout, ws_tx.send(WsMessage::Text(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Client {id} send failed: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!("Client {id} send timed out, closing");
                        break;
                    }
                }
            }
        } => {},
        // Client → Relay: commands, answered in receipt order
        _ = async {
            while let Some(Ok(msg)) = ws_rx.next().await {
                let reply = match msg {
                    WsMessage::Text(text) => session.handle_text(text.as_str()).await,
                    WsMessage::Binary(_) => {
                        LiveEvent::error(ErrorKind::BadRequest, "binary frames are not supported")
                    }
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                let frame = match encode_event(&reply) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Client {id}: {e:#}");
                        continue;
                    }
                };
                if event_tx.send(frame).await.is_err() {
                    break;
                }
            }
        } => {},
    }

    state.hub.unsubscribe(id).await;
    info!(
        "Client {id} disconnected (remaining: {})",
        state.hub.subscriber_count().await
    );
}
