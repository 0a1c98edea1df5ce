//! WebSocket transport (§6.1) and the connection state machine (§4.7).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use mudvault_protocol::{
    ErrorCode, ErrorPayload,
    envelope::{Endpoint, Envelope, MessageType},
    payload::{AuthPayload, Payload},
};
use mudvault_routing::MudInfo;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    connection::{Heartbeat, OutboundQueue},
    registry::ConnectionHandle,
    state::GatewayState,
};

/// Largest frame accepted before validation even looks at it (§6.2
/// `MESSAGE_TOO_LARGE`).
const MAX_FRAME_BYTES: usize = 64 * 1024;

pub async fn upgrade(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, peer: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let auth_deadline = Duration::from_secs(state.config.server.auth_deadline_secs);
    let authenticated = tokio::time::timeout(auth_deadline, authenticate(&mut ws_rx, &mut ws_tx, &state)).await;

    let mud = match authenticated {
        Ok(Some(mud)) => mud,
        Ok(None) => return,
        Err(_) => {
            debug!("connection timed out before completing authentication");
            let _ = send_error(&mut ws_tx, ErrorCode::AuthenticationFailed, &Endpoint::default()).await;
            return;
        },
    };

    info!(mud = %mud, "connection authenticated, entering LIVE");

    let outbound = Arc::new(OutboundQueue::new(state.config.server.outbound_queue_capacity));
    let heartbeat = Arc::new(Heartbeat::new(mudvault_common::time::now_unix_secs()));
    let (wake_tx, mut wake_rx) = mpsc::unbounded_channel::<()>();
    let cancel = CancellationToken::new();

    let handle = Arc::new(ConnectionHandle::new(
        mud.clone(),
        outbound.clone(),
        wake_tx.clone(),
        heartbeat.clone(),
        cancel.clone(),
    ));

    match state.connections.register(&mud, handle.clone()) {
        Ok(Some(displaced)) => displaced.cancel.cancel(),
        Ok(None) => {},
        Err(_existing) => {
            let _ = send_error(&mut ws_tx, ErrorCode::Unauthorized, &Endpoint::mud(&mud)).await;
            return;
        },
    }

    if let Err(e) = state.store.sadd(&mudvault_store::keys::connected_muds(), &mud).await {
        warn!(error = %e, mud = %mud, "failed to register mud in shared store");
    }

    let info = MudInfo {
        host: Some(peer.ip().to_string()),
    };
    if let Ok(json) = serde_json::to_string(&info)
        && let Err(e) = state.store.set(&mudvault_store::keys::mud_info(&mud), &json, None).await
    {
        warn!(error = %e, mud = %mud, "failed to record mud_info in shared store");
    }

    spawn_route_subscriber(&state, &mud, outbound.clone(), wake_tx.clone(), cancel.clone());

    run_live(ws_tx, ws_rx, &state, &handle, &mut wake_rx).await;

    // A `DisplaceOld` eviction already swapped the registry entry for `mud`
    // over to the newcomer before cancelling us; only the connection that is
    // still the one on record gets to retire the roster entry and mark
    // presence offline. Otherwise this teardown would delete the survivor's
    // registration instead of its own (§4.7, §4.9).
    if state.connections.deregister(&mud, handle.id) {
        let online_users = handle.online_users_snapshot();
        state.presence.mark_mud_offline(&mud, &online_users).await.ok();
        if let Err(e) = state.store.srem(&mudvault_store::keys::connected_muds(), &mud).await {
            warn!(error = %e, mud = %mud, "failed to deregister mud from shared store");
        }
    }
    info!(mud = %mud, "connection closed");
}

/// CONNECTING → AUTHENTICATING: accept only `auth`, `ping`, `pong` frames
/// until a valid `auth` arrives. Returns the authenticated MUD name, or
/// `None` if the socket closed or sent something disqualifying first.
async fn authenticate(
    ws_rx: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &Arc<GatewayState>,
) -> Option<String> {
    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        if text.len() > MAX_FRAME_BYTES {
            let _ = send_error(ws_tx, ErrorCode::MessageTooLarge, &Endpoint::default()).await;
            return None;
        }

        let Ok(mut envelope) = mudvault_protocol::decode(&text) else {
            let _ = send_error(ws_tx, ErrorCode::InvalidMessage, &Endpoint::default()).await;
            continue;
        };

        match envelope.r#type {
            MessageType::Ping | MessageType::Pong => continue,
            MessageType::Auth => {},
            _ => {
                let _ = send_error(ws_tx, ErrorCode::Unauthorized, &envelope.from).await;
                continue;
            },
        }

        let Ok(Payload::Auth(AuthPayload { mud_name, token })) =
            mudvault_protocol::validate::validate(&mut envelope)
        else {
            let _ = send_error(ws_tx, ErrorCode::InvalidMessage, &envelope.from).await;
            continue;
        };

        match state.auth.authenticate(&mud_name, &token).await {
            Ok(mud) => {
                let reply = Envelope::new(
                    MessageType::Auth,
                    Endpoint::mud("gateway"),
                    Endpoint::mud(&mud),
                    serde_json::json!({"mudName": mud, "token": token}),
                );
                if ws_tx.send(frame(&reply)).await.is_err() {
                    return None;
                }
                return Some(mud);
            },
            Err(e) => {
                debug!(error = %e, "authentication failed");
                let _ = send_error(ws_tx, ErrorCode::AuthenticationFailed, &envelope.from).await;
            },
        }
    }
    None
}

async fn run_live(
    mut ws_tx: impl SinkExt<Message, Error = axum::Error> + Unpin,
    mut ws_rx: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    state: &Arc<GatewayState>,
    handle: &Arc<ConnectionHandle>,
    wake_rx: &mut mpsc::UnboundedReceiver<()>,
) {
    let mud = handle.mud.as_str();
    let interval_secs = state.config.heartbeat.interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            () = handle.cancel.cancelled() => {
                info!(mud, "connection cancelled (displaced or shutting down)");
                let _ = ws_tx.send(close_frame("server draining")).await;
                break;
            }
            _ = ticker.tick() => {
                let now = mudvault_common::time::now_unix_secs();
                if handle.heartbeat.is_stale(now, interval_secs) {
                    warn!(mud, "heartbeat timeout, draining connection");
                    let _ = ws_tx.send(close_frame("heartbeat timeout")).await;
                    break;
                }
                handle.heartbeat.record_ping_sent(now);
                let ping = Envelope::new(
                    MessageType::Ping,
                    Endpoint::mud("gateway"),
                    Endpoint::mud(mud),
                    serde_json::json!({"timestamp": now}),
                );
                if ws_tx.send(frame(&ping)).await.is_err() {
                    break;
                }
            }
            _ = wake_rx.recv() => {
                while let Some(envelope) = handle.outbound.pop() {
                    if ws_tx.send(frame(&envelope)).await.is_err() {
                        return;
                    }
                }
            }
            frame_in = ws_rx.next() => {
                let Some(Ok(msg)) = frame_in else { break };
                match msg {
                    Message::Text(text) => {
                        if handle_inbound_frame(&text, state, handle, &mut ws_tx).await {
                            warn!(mud, "too many malformed frames, closing connection");
                            let _ = ws_tx.send(close_frame("too many malformed frames")).await;
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Handle one inbound text frame. Returns `true` if the connection has
/// accumulated enough malformed frames that the caller should close it
/// (§4.1, §7's malformed-frame threshold).
async fn handle_inbound_frame(
    text: &str,
    state: &Arc<GatewayState>,
    handle: &Arc<ConnectionHandle>,
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
) -> bool {
    let mud = handle.mud.as_str();

    if text.len() > MAX_FRAME_BYTES {
        let _ = send_error(ws_tx, ErrorCode::MessageTooLarge, &Endpoint::mud(mud)).await;
        return note_malformed(state, handle);
    }

    let Ok(mut envelope) = mudvault_protocol::decode(text) else {
        let _ = send_error(ws_tx, ErrorCode::InvalidMessage, &Endpoint::mud(mud)).await;
        return note_malformed(state, handle);
    };

    if let Err(e) = mudvault_protocol::validate::validate(&mut envelope) {
        let _ = send_error_with_code(ws_tx, e.code(), &Endpoint::mud(mud)).await;
        return note_malformed(state, handle);
    }

    if matches!(envelope.r#type, MessageType::Auth) {
        // Re-authentication on an already-LIVE connection is a no-op; the
        // connection is already bound to its MUD identity.
        return false;
    }

    if envelope.r#type == MessageType::Presence {
        if let (Some(user), Ok(Payload::Presence(payload))) = (
            envelope.from.user.clone(),
            Payload::parse(MessageType::Presence, &envelope.payload),
        ) {
            let online = !matches!(payload.status, mudvault_protocol::payload::PresenceStatus::Offline);
            handle.note_presence(&user, online);
        }
    }

    if let Some(reply) = state.router.dispatch(envelope, mud, state.connections.as_ref()).await {
        let _ = ws_tx.send(frame(&reply)).await;
    }
    false
}

/// Subscribe to `mud`'s cross-gateway forwarding channel (§4.8, §6.3
/// `route:<mud>`) so envelopes another gateway instance published for this
/// MUD — because it wasn't connected there — reach it here. Runs until the
/// connection's `cancel` token fires or the store drops the subscription.
fn spawn_route_subscriber(
    state: &Arc<GatewayState>,
    mud: &str,
    outbound: Arc<OutboundQueue>,
    wake: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
) {
    let store = state.store.clone();
    let mud = mud.to_string();
    tokio::spawn(async move {
        let mut rx = match store.subscribe(&mudvault_store::keys::route(&mud)).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, mud = %mud, "failed to subscribe to route channel");
                return;
            },
        };
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match mudvault_protocol::decode(&msg.payload) {
                        Ok(envelope) => {
                            outbound.push(envelope);
                            let _ = wake.send(());
                        },
                        Err(e) => warn!(error = %e, mud = %mud, "dropping malformed routed frame"),
                    }
                }
            }
        }
    });
}

fn note_malformed(state: &Arc<GatewayState>, handle: &Arc<ConnectionHandle>) -> bool {
    let now = mudvault_common::time::now_unix_secs();
    let threshold = state.config.server.malformed_frame_threshold;
    let window_secs = state.config.server.malformed_window_secs;
    handle.note_malformed_frame(now, threshold, window_secs)
}

fn frame(envelope: &Envelope) -> Message {
    Message::Text(mudvault_protocol::encode(envelope).unwrap_or_default().into())
}

fn close_frame(reason: &str) -> Message {
    Message::Close(Some(axum::extract::ws::CloseFrame {
        code: axum::extract::ws::close_code::NORMAL,
        reason: reason.to_string().into(),
    }))
}

async fn send_error(
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    code: ErrorCode,
    to: &Endpoint,
) -> Result<(), axum::Error> {
    send_error_with_code(ws_tx, code, to).await
}

async fn send_error_with_code(
    ws_tx: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    code: ErrorCode,
    to: &Endpoint,
) -> Result<(), axum::Error> {
    let envelope = Envelope::new(
        MessageType::Error,
        Endpoint::mud("gateway"),
        to.clone(),
        serde_json::to_value(ErrorPayload::from_code(code)).unwrap_or(serde_json::Value::Null),
    );
    ws_tx.send(frame(&envelope)).await
}
