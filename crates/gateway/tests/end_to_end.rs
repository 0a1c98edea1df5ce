#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end scenarios over a real WebSocket connection (§8): auth, origin
//! stamping, unknown-destination errors, rate limiting, channel fan-out, and
//! heartbeat timeout.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use futures::{SinkExt, StreamExt};
use mudvault_config::MudvaultConfig;
use mudvault_gateway::{GatewayState, ws};
use mudvault_protocol::{
    decode, encode,
    envelope::{Endpoint, Envelope, MessageType},
    payload::Payload,
};
use mudvault_store::memory::InMemoryStore;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const SECRET: &str = "test-registration-secret";

async fn start_server(mut config: MudvaultConfig) -> (SocketAddr, Arc<GatewayState>) {
    config.auth.registration_secret = Some(SECRET.to_string());
    let state = GatewayState::new(config, InMemoryStore::new());

    let app = Router::new().route("/ws", get(ws::upgrade)).with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    (addr, state)
}

/// Register a MUD and issue it a session token, as the out-of-band
/// registration surface would.
async fn provision(state: &GatewayState, mud: &str) -> String {
    state.auth.register(mud, "api-key", SECRET).await.unwrap();
    state.auth.issue_token(mud, "api-key").await.unwrap().token
}

async fn connect(addr: SocketAddr) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn authenticate(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    mud: &str,
    token: &str,
) {
    let auth = Envelope::new(
        MessageType::Auth,
        Endpoint::mud(mud),
        Endpoint::mud("gateway"),
        serde_json::json!({"mudName": mud, "token": token}),
    );
    ws.send(WsMessage::Text(encode(&auth).unwrap().into())).await.unwrap();
    let reply = recv_envelope(ws).await;
    assert_eq!(reply.r#type, MessageType::Auth);
}

async fn recv_envelope(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> Envelope {
    loop {
        match ws.next().await.expect("connection closed unexpectedly").unwrap() {
            WsMessage::Text(text) => return decode(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn short_heartbeat_config() -> MudvaultConfig {
    let mut config = MudvaultConfig::default();
    config.heartbeat.interval_secs = 1;
    config
}

#[tokio::test]
async fn auth_then_tell_stamps_sender_origin() {
    let (addr, state) = start_server(MudvaultConfig::default()).await;
    let alpha_token = provision(&state, "Alpha").await;
    let beta_token = provision(&state, "Beta").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &alpha_token).await;
    let mut beta = connect(addr).await;
    authenticate(&mut beta, "Beta", &beta_token).await;

    // Alpha spoofs its own `from.mud` as Beta; the router must stamp the
    // authenticated identity over whatever the client sent (§4.1, §4.8).
    let mut tell = Envelope::new(
        MessageType::Tell,
        Endpoint::mud("Beta"),
        Endpoint::user("Beta", "bob"),
        serde_json::json!({"message": "hello"}),
    );
    tell.from.user = Some("ann".to_string());
    alpha.send(WsMessage::Text(encode(&tell).unwrap().into())).await.unwrap();

    let delivered = recv_envelope(&mut beta).await;
    assert_eq!(delivered.r#type, MessageType::Tell);
    assert_eq!(delivered.from.mud, "Alpha", "origin must be the authenticated mud, not the spoofed one");
    assert_eq!(delivered.from.user.as_deref(), Some("ann"));
}

#[tokio::test]
async fn tell_to_unknown_mud_returns_error() {
    let (addr, state) = start_server(MudvaultConfig::default()).await;
    let token = provision(&state, "Alpha").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &token).await;

    let tell = Envelope::new(
        MessageType::Tell,
        Endpoint::mud("Alpha"),
        Endpoint::user("Ghost", "nobody"),
        serde_json::json!({"message": "hello?"}),
    );
    alpha.send(WsMessage::Text(encode(&tell).unwrap().into())).await.unwrap();

    let reply = recv_envelope(&mut alpha).await;
    assert_eq!(reply.r#type, MessageType::Error);
    match Payload::parse(MessageType::Error, &reply.payload).unwrap() {
        Payload::Error(err) => assert_eq!(err.code, mudvault_protocol::ErrorCode::MudNotFound.code()),
        other => panic!("expected an error payload, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_denies_after_budget_exhausted() {
    let mut config = MudvaultConfig::default();
    config.ratelimit.per_user_per_minute = 2;
    config.ratelimit.per_peer_multiplier = 1;
    let (addr, state) = start_server(config).await;
    let alpha_token = provision(&state, "Alpha").await;
    let beta_token = provision(&state, "Beta").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &alpha_token).await;
    let mut beta = connect(addr).await;
    authenticate(&mut beta, "Beta", &beta_token).await;

    for _ in 0..2 {
        let tell = Envelope::new(
            MessageType::Tell,
            Endpoint::mud("Alpha"),
            Endpoint::user("Beta", "bob"),
            serde_json::json!({"message": "hi"}),
        );
        alpha.send(WsMessage::Text(encode(&tell).unwrap().into())).await.unwrap();
        let delivered = recv_envelope(&mut beta).await;
        assert_eq!(delivered.r#type, MessageType::Tell);
    }

    let tell = Envelope::new(
        MessageType::Tell,
        Endpoint::mud("Alpha"),
        Endpoint::user("Beta", "bob"),
        serde_json::json!({"message": "over budget"}),
    );
    alpha.send(WsMessage::Text(encode(&tell).unwrap().into())).await.unwrap();
    let reply = recv_envelope(&mut alpha).await;
    assert_eq!(reply.r#type, MessageType::Error);
    match Payload::parse(MessageType::Error, &reply.payload).unwrap() {
        Payload::Error(err) => assert_eq!(err.code, mudvault_protocol::ErrorCode::RateLimited.code()),
        other => panic!("expected an error payload, got {other:?}"),
    }
}

#[tokio::test]
async fn channel_post_fans_out_to_members_in_order() {
    let (addr, state) = start_server(MudvaultConfig::default()).await;
    let alpha_token = provision(&state, "Alpha").await;
    let beta_token = provision(&state, "Beta").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &alpha_token).await;
    let mut beta = connect(addr).await;
    authenticate(&mut beta, "Beta", &beta_token).await;

    for (conn, mud) in [(&mut alpha, "Alpha"), (&mut beta, "Beta")] {
        let join = Envelope::new(
            MessageType::Channel,
            Endpoint::user(mud, "someone"),
            Endpoint::mud("gateway"),
            serde_json::json!({"channel": "gossip", "action": "join"}),
        );
        conn.send(WsMessage::Text(encode(&join).unwrap().into())).await.unwrap();
    }

    // Alpha joined first as the channel's only member, so its own join
    // wasn't fanned out to anyone; Beta's join lands on both members —
    // drain that notice off Beta's queue before the posts.
    let beta_join_notice = recv_envelope(&mut beta).await;
    assert_eq!(beta_join_notice.payload["action"], "join");

    for text in ["first", "second"] {
        let post = Envelope::new(
            MessageType::Channel,
            Endpoint::user("Alpha", "ann"),
            Endpoint::mud("gateway"),
            serde_json::json!({"channel": "gossip", "action": "message", "message": text}),
        );
        alpha.send(WsMessage::Text(encode(&post).unwrap().into())).await.unwrap();
    }

    // Beta, as a member, receives both posts in order via fan-out.
    let first = recv_envelope(&mut beta).await;
    let second = recv_envelope(&mut beta).await;
    assert_eq!(first.payload["message"], "first");
    assert_eq!(second.payload["message"], "second");
}

#[tokio::test]
async fn channel_leave_notifies_remaining_members() {
    let (addr, state) = start_server(MudvaultConfig::default()).await;
    let alpha_token = provision(&state, "Alpha").await;
    let beta_token = provision(&state, "Beta").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &alpha_token).await;
    let mut beta = connect(addr).await;
    authenticate(&mut beta, "Beta", &beta_token).await;

    for (conn, mud) in [(&mut alpha, "Alpha"), (&mut beta, "Beta")] {
        let join = Envelope::new(
            MessageType::Channel,
            Endpoint::user(mud, "someone"),
            Endpoint::mud("gateway"),
            serde_json::json!({"channel": "gossip", "action": "join"}),
        );
        conn.send(WsMessage::Text(encode(&join).unwrap().into())).await.unwrap();
    }
    // Beta's own join notice, fanned out to both members.
    let beta_join_notice = recv_envelope(&mut beta).await;
    assert_eq!(beta_join_notice.payload["action"], "join");
    let alpha_join_notice = recv_envelope(&mut alpha).await;
    assert_eq!(alpha_join_notice.payload["action"], "join");

    let leave = Envelope::new(
        MessageType::Channel,
        Endpoint::user("Beta", "someone"),
        Endpoint::mud("gateway"),
        serde_json::json!({"channel": "gossip", "action": "leave"}),
    );
    beta.send(WsMessage::Text(encode(&leave).unwrap().into())).await.unwrap();

    // §4.6: leave must notify subscribers, same as join and message do.
    let notice = recv_envelope(&mut alpha).await;
    assert_eq!(notice.payload["action"], "leave");
}

#[tokio::test]
async fn heartbeat_timeout_closes_connection_and_marks_offline() {
    let (addr, state) = start_server(short_heartbeat_config()).await;
    let token = provision(&state, "Alpha").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &token).await;

    // Never reply to pings; after 2x the heartbeat interval the gateway
    // closes the connection as stale (§4.7).
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alpha.next().await {
                Some(Ok(WsMessage::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("connection should close within the heartbeat deadline");
    assert!(closed);

    // Give the post-close cleanup task a moment to mark presence offline.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.connections.get("Alpha").is_none());
}

#[tokio::test]
async fn repeated_malformed_frames_close_the_connection() {
    let mut config = MudvaultConfig::default();
    config.server.malformed_frame_threshold = 2;
    config.server.malformed_window_secs = 60;
    let (addr, state) = start_server(config).await;
    let token = provision(&state, "Alpha").await;

    let mut alpha = connect(addr).await;
    authenticate(&mut alpha, "Alpha", &token).await;

    for _ in 0..2 {
        alpha.send(WsMessage::Text("not json".into())).await.unwrap();
        let reply = recv_envelope(&mut alpha).await;
        assert_eq!(reply.r#type, MessageType::Error);
    }

    // The 2nd malformed frame trips the threshold; the gateway closes the
    // socket instead of waiting for a 3rd (§4.1, §7).
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alpha.next().await {
                Some(Ok(WsMessage::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("connection should close after the malformed-frame threshold");
    assert!(closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.connections.get("Alpha").is_none());
}
