//! 网关事件通道 handler
//!
//! `GET /websocket/events?Auth-Realm={realm}`
//!
//! 网关持 client-credentials 签发的 token 升级 WebSocket；升级后由
//! 传输泵在套接字与连接器的有界通道之间搬运文本帧，协议本身由
//! 连接器驱动。停用的网关在接入时即被拒绝。

use crate::middleware::bearer_token;
use crate::AppState;
use ams_gateway::{in_memory_pair, MessageChannel};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

/// 事件通道查询参数
#[derive(serde::Deserialize)]
pub struct EventsParams {
    #[serde(rename = "Auth-Realm")]
    auth_realm: String,
}

pub async fn events_websocket(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let identity = match state.auth.verify_gateway_token(token) {
        Ok(identity) => identity,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    if identity.realm != params.auth_realm {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_gateway_socket(state, identity, socket))
}

async fn handle_gateway_socket(
    state: AppState,
    identity: ams_auth::GatewayIdentity,
    socket: WebSocket,
) {
    let capacity = state.config.event_queue_capacity;
    let (manager_ch, pump_ch) = in_memory_pair(capacity);
    let connector = match state
        .gateway_service
        .attach(&identity.gateway_id, &identity.realm, manager_ch)
        .await
    {
        Ok(connector) => connector,
        Err(err) => {
            warn!(
                gateway_id = %identity.gateway_id,
                error = %err,
                "gateway channel refused"
            );
            let mut socket = socket;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let MessageChannel {
        outbound: to_connector,
        inbound: mut from_connector,
    } = pump_ch;
    let mut closed = connector.closed_watch();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            maybe = stream.next() => match maybe {
                Some(Ok(Message::Text(text))) => {
                    // 连接器消费跟不上时在此等待，套接字不再被读
                    if to_connector.send(text).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "websocket read failed");
                    break;
                }
            },
            maybe = from_connector.recv() => match maybe {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = closed.changed() => {
                if *closed.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
    info!(gateway_id = %identity.gateway_id, "gateway socket closed");
}
