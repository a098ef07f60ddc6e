//! Live channel against a local Socket.IO-speaking WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use venuebook_common::models::BookingEventKind;
use venuebook_common::Redirect;
use venuebook_common::services::TokenSource;
use venuebook_config::NotificationConfig;
use venuebook_gateway::MockGateway;
use venuebook_store::{KeyValueStore, MemoryStore, NotificationLog};
use venuebook_sync::{
    BookingEventRouter, BookingViewCache, ConnectionState, LiveChannel, LiveHandle, LiveSettings,
    NoticeBoard, NoticeLevel, RetryPolicy,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SwappableToken(Mutex<Option<String>>);

impl SwappableToken {
    fn set(&self, token: &str) {
        *self.0.lock().unwrap() = Some(token.to_string());
    }
}

impl TokenSource for SwappableToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What the server saw during one connection handshake.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    header: Option<String>,
    auth_token: Option<String>,
}

enum ServerCmd {
    Emit(String),
    Drop,
}

struct TestServer {
    url: String,
    seen: mpsc::UnboundedReceiver<Seen>,
    commands: mpsc::UnboundedSender<ServerCmd>,
}

const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

async fn start_server(reject: &'static str) -> TestServer {
    start_server_with(reject, OPEN).await
}

/// Serves connections one at a time, opening each with `open`. Tokens equal
/// to `reject` are refused with a namespace connect error.
async fn start_server_with(reject: &'static str, open: &'static str) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (seen_tx, seen) = mpsc::unbounded_channel();
    let (commands, mut command_rx) = mpsc::unbounded_channel::<ServerCmd>();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let header = Arc::new(Mutex::new(None));
            let captured = header.clone();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                assert_eq!(req.uri().path(), "/socket.io/");
                assert!(req.uri().query().unwrap_or("").contains("EIO=4"));
                *captured.lock().unwrap() = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(resp)
            };
            let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };
            ws.send(Message::Text(open.into())).await.unwrap();

            let connect = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                _ => continue,
            };
            let auth: Value = serde_json::from_str(connect.trim_start_matches("40/ws,")).unwrap();
            let auth_token = auth["token"].as_str().map(str::to_string);
            let header_value = header.lock().unwrap().clone();
            seen_tx
                .send(Seen {
                    header: header_value,
                    auth_token: auth_token.clone(),
                })
                .unwrap();

            if auth_token.as_deref() == Some(reject) {
                let _ = ws
                    .send(Message::Text(r#"44/ws,{"message":"invalid token"}"#.into()))
                    .await;
                let _ = ws.close(None).await;
                continue;
            }
            ws.send(Message::Text(r#"40/ws,{"sid":"n1"}"#.into()))
                .await
                .unwrap();

            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(ServerCmd::Emit(frame)) => {
                            if ws.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCmd::Drop) | None => break,
                    },
                    incoming = ws.next() => match incoming {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        }
    });

    TestServer {
        url,
        seen,
        commands,
    }
}

fn settings(url: &str, max_attempts: u32) -> LiveSettings {
    LiveSettings {
        url: url.to_string(),
        path: "/socket.io/".to_string(),
        namespace: "/ws".to_string(),
        retry: RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            factor: 2.0,
        },
    }
}

async fn wait_for_state(handle: &LiveHandle, wanted: ConnectionState) {
    let mut state = handle.state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == wanted))
        .await
        .expect("state not reached in time")
        .unwrap();
}

async fn next_seen(server: &mut TestServer) -> Seen {
    tokio::time::timeout(WAIT, server.seen.recv())
        .await
        .expect("no connection in time")
        .unwrap()
}

#[tokio::test]
async fn test_reconnect_after_token_change_uses_new_token() {
    let mut server = start_server("never").await;
    let tokens = Arc::new(SwappableToken::default());
    tokens.set("old-token");

    let handle = LiveChannel::spawn(settings(&server.url, 5), tokens.clone());
    let first = next_seen(&mut server).await;
    assert_eq!(first.auth_token.as_deref(), Some("old-token"));
    assert_eq!(first.header.as_deref(), Some("Bearer old-token"));
    wait_for_state(&handle, ConnectionState::Connected).await;

    // Re-login, then the server drops the connection
    tokens.set("new-token");
    server.commands.send(ServerCmd::Drop).unwrap();

    let second = next_seen(&mut server).await;
    assert_eq!(second.auth_token.as_deref(), Some("new-token"));
    assert_eq!(second.header.as_deref(), Some("Bearer new-token"));
    wait_for_state(&handle, ConnectionState::Connected).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_events_reach_cache_log_and_notices() {
    let mut server = start_server("never").await;
    let tokens = Arc::new(SwappableToken::default());
    tokens.set("t");

    let cache = Arc::new(BookingViewCache::new(Arc::new(MockGateway::new()), 3));
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let log = Arc::new(NotificationLog::open(store, &NotificationConfig::default()).unwrap());
    let notices = NoticeBoard::default();
    let mut notice_rx = notices.subscribe();

    let handle = LiveChannel::spawn(settings(&server.url, 5), tokens);
    let mut events = handle.subscribe();
    let router = BookingEventRouter::new(cache.clone(), log.clone(), notices).spawn(handle.subscribe());
    next_seen(&mut server).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    server.commands.send(ServerCmd::Emit("2".into())).unwrap();
    server
        .commands
        .send(ServerCmd::Emit(r#"42/ws,["venue.updated",{"id":"v1"}]"#.into()))
        .unwrap();
    server
        .commands
        .send(ServerCmd::Emit(
            r#"42/ws,["booking.updated",{"id":"b1","title":"Finals","startAt":"2025-05-06T09:00:00.000Z","endAt":"2025-05-06T10:00:00.000Z","venueId":"v1"}]"#.into(),
        ))
        .unwrap();

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, BookingEventKind::Updated);
    assert_eq!(event.payload.id, "b1");
    assert_eq!(event.payload.venue_id.as_deref(), Some("v1"));

    let notice = tokio::time::timeout(WAIT, notice_rx.recv()).await.unwrap().unwrap();
    assert_eq!(notice.message, "Booking updated: Finals");
    assert_eq!(cache.generation(), 1);
    assert_eq!(log.items()[0].booking_id, "b1");

    handle.shutdown().await;
    router.await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_exhausts_retries_then_manual_reconnect() {
    let mut server = start_server("bad").await;
    let tokens = Arc::new(SwappableToken::default());
    tokens.set("bad");

    let handle = LiveChannel::spawn(settings(&server.url, 2), tokens.clone());
    next_seen(&mut server).await;
    next_seen(&mut server).await;
    wait_for_state(&handle, ConnectionState::Failed).await;
    let failure = handle.last_failure().expect("failure recorded");
    assert_eq!(failure.level, NoticeLevel::Error);
    assert_eq!(failure.redirect, Some(Redirect::Login));

    tokens.set("good");
    handle.reconnect().await;
    let seen = next_seen(&mut server).await;
    assert_eq!(seen.auth_token.as_deref(), Some("good"));
    wait_for_state(&handle, ConnectionState::Connected).await;
    assert!(handle.last_failure().is_none());

    let state = handle.state();
    handle.shutdown().await;
    assert_eq!(*state.borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_silent_server_is_dropped_after_heartbeat() {
    let mut server = start_server_with(
        "never",
        r#"0{"sid":"s1","upgrades":[],"pingInterval":100,"pingTimeout":100}"#,
    )
    .await;
    let tokens = Arc::new(SwappableToken::default());
    tokens.set("t");

    let handle = LiveChannel::spawn(settings(&server.url, 5), tokens);
    next_seen(&mut server).await;
    wait_for_state(&handle, ConnectionState::Connected).await;

    // The server never pings; the client gives up on it and connects again
    let mut state = handle.state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s != ConnectionState::Connected))
        .await
        .expect("connection not dropped in time")
        .unwrap();
    next_seen(&mut server).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_server_fails_after_budget() {
    // Bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let handle = LiveChannel::spawn(settings(&url, 3), Arc::new(SwappableToken::default()));
    wait_for_state(&handle, ConnectionState::Failed).await;
    handle.shutdown().await;
}
