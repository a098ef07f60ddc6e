//! Engine.IO v4 / Socket.IO v4 text frames.
//!
//! Only the subset used by the booking event stream is understood: open,
//! close, ping/pong, namespace connect/disconnect/error and events. Anything
//! else decodes to `Packet::Other`.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::LiveError;

pub const PONG: &str = "3";

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Engine.IO server defaults, used when the open packet leaves them out.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

impl OpenInfo {
    /// Longest silence the server may leave between two frames before the
    /// connection is considered dead.
    pub fn heartbeat(&self) -> Duration {
        let interval = match self.ping_interval {
            0 => DEFAULT_PING_INTERVAL_MS,
            ms => ms,
        };
        let timeout = match self.ping_timeout {
            0 => DEFAULT_PING_TIMEOUT_MS,
            ms => ms,
        };
        Duration::from_millis(interval.saturating_add(timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Connect { namespace: String },
    ConnectError { namespace: String, message: String },
    Disconnect { namespace: String },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
    },
    Other(String),
}

/// Splits `/ws,rest` into (`/ws`, `rest`). Without a namespace prefix the
/// main namespace `/` is implied.
fn split_namespace(body: &str) -> (&str, &str) {
    if body.starts_with('/') {
        match body.find(',') {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => (body, ""),
        }
    } else {
        ("/", body)
    }
}

pub fn decode(text: &str) -> Result<Packet, LiveError> {
    let mut chars = text.chars();
    let engine = chars
        .next()
        .ok_or_else(|| LiveError::Protocol("empty frame".into()))?;
    let rest = chars.as_str();
    match engine {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| LiveError::Protocol(format!("bad open packet: {}", e))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest),
        _ => Ok(Packet::Other(text.to_string())),
    }
}

fn decode_socket(text: &str) -> Result<Packet, LiveError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| LiveError::Protocol("empty message".into()))?;
    let (namespace, body) = split_namespace(chars.as_str());
    let namespace = namespace.to_string();
    match kind {
        '0' => Ok(Packet::Connect { namespace }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            // Optional ack id before the payload
            let payload = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut args: Vec<Value> = serde_json::from_str(payload)
                .map_err(|e| LiveError::Protocol(format!("bad event payload: {}", e)))?;
            if args.is_empty() {
                return Err(LiveError::Protocol("event without name".into()));
            }
            match args.remove(0) {
                Value::String(name) => Ok(Packet::Event {
                    namespace,
                    name,
                    args,
                }),
                other => Err(LiveError::Protocol(format!("event name is not a string: {}", other))),
            }
        }
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    v => v.get("message").and_then(Value::as_str).map(str::to_string),
                })
                .unwrap_or_else(|| "connection refused".to_string());
            Ok(Packet::ConnectError { namespace, message })
        }
        _ => Ok(Packet::Other(format!("4{}", text))),
    }
}

/// Namespace connect carrying the bearer token as auth payload.
pub fn encode_connect(namespace: &str, token: Option<&str>) -> String {
    let auth = match token {
        Some(token) => json!({ "token": token }),
        None => json!({}),
    };
    if namespace == "/" {
        format!("40{}", auth)
    } else {
        format!("40{},{}", namespace, auth)
    }
}

/// WebSocket endpoint for an http(s) base URL, e.g.
/// `ws://host:3001/socket.io/?EIO=4&transport=websocket`.
pub fn endpoint(base_url: &str, path: &str) -> Result<String, LiveError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| LiveError::InvalidUrl(format!("'{}': {}", base_url, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(LiveError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| LiveError::InvalidUrl(format!("cannot use scheme '{}'", scheme)))?;
    let path = if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    };
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}
