//! Live event channel.
//!
//! One Socket.IO connection per session, owned by a single driver task, so
//! at most one connection attempt is ever in flight. The bearer token is read
//! from the [`TokenSource`] on every attempt; a re-login is picked up by the
//! next (re)connection. Reconnects follow a bounded [`RetryPolicy`]; once it
//! is exhausted the channel stays `Failed` until [`LiveHandle::reconnect`].

pub mod frame;
pub mod router;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use venuebook_common::bearer;
use venuebook_common::models::{BookingEvent, BookingEventKind, BookingEventPayload};
use venuebook_common::services::TokenSource;
use venuebook_common::VenuebookError;
use venuebook_config::{AppConfig, ReconnectConfig};

use crate::error::LiveError;
use crate::notice::Notice;
use frame::{OpenInfo, Packet};

pub use router::BookingEventRouter;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting { attempt: u32 },
    Connected,
    /// Waiting before the next attempt
    Reconnecting,
    /// Retry budget exhausted
    Failed,
    Closed,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for RetryPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            factor: config.factor,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `failures` consecutive failed attempts.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub url: String,
    pub path: String,
    pub namespace: String,
    pub retry: RetryPolicy,
}

impl LiveSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            url: config.live_url().to_string(),
            path: config.live.path.clone(),
            namespace: config.live.namespace.clone(),
            retry: RetryPolicy::from(&config.live.reconnect),
        }
    }
}

#[derive(Debug)]
enum Command {
    Reconnect,
    Shutdown,
}

/// Handle to the running channel. Dropping it shuts the channel down.
pub struct LiveHandle {
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<BookingEvent>,
    commands: mpsc::Sender<Command>,
    failure: Arc<Mutex<Option<Notice>>>,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Why the latest connection attempt failed; cleared once connected.
    pub fn last_failure(&self) -> Option<Notice> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drops the current connection, if any, and starts a fresh attempt with
    /// a reset retry budget.
    pub async fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect).await;
    }

    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("live channel task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct LiveChannel;

impl LiveChannel {
    /// Starts the driver task. Must be called within a Tokio runtime.
    pub fn spawn(settings: LiveSettings, tokens: Arc<dyn TokenSource>) -> LiveHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(128);
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let failure = Arc::new(Mutex::new(None));
        let driver = Driver {
            settings,
            tokens,
            state: state_tx,
            events: events.clone(),
            commands: commands_rx,
            failure: failure.clone(),
        };
        let task = tokio::spawn(driver.run());
        LiveHandle {
            state: state_rx,
            events,
            commands: commands_tx,
            failure,
            task: Some(task),
        }
    }
}

enum SessionEnd {
    Dropped(LiveError),
    Reconnect,
    Shutdown,
}

struct Driver {
    settings: LiveSettings,
    tokens: Arc<dyn TokenSource>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<BookingEvent>,
    commands: mpsc::Receiver<Command>,
    failure: Arc<Mutex<Option<Notice>>>,
}

impl Driver {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn record_failure(&self, failure: Option<Notice>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = failure;
    }

    async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            self.set_state(ConnectionState::Connecting {
                attempt: failures + 1,
            });
            match self.connect().await {
                Ok((socket, heartbeat)) => {
                    failures = 0;
                    self.record_failure(None);
                    info!("live channel connected to {}", self.settings.namespace);
                    self.set_state(ConnectionState::Connected);
                    match self.serve(socket, heartbeat).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Reconnect => {
                            info!("live channel reconnect requested");
                            continue;
                        }
                        SessionEnd::Dropped(reason) => {
                            warn!("live channel dropped: {}", reason);
                        }
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(
                        "live channel attempt {}/{} failed: {}",
                        failures, self.settings.retry.max_attempts, err
                    );
                    self.record_failure(Some(Notice::from_error(&VenuebookError::from(err))));
                    if self.settings.retry.exhausted(failures) {
                        error!("live channel giving up after {} attempts", failures);
                        self.set_state(ConnectionState::Failed);
                        match self.commands.recv().await {
                            Some(Command::Reconnect) => {
                                failures = 0;
                                continue;
                            }
                            Some(Command::Shutdown) | None => break,
                        }
                    }
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.settings.retry.delay(failures.max(1));
            debug!("next live channel attempt in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => failures = 0,
                    Some(Command::Shutdown) | None => break,
                },
            }
        }
        self.set_state(ConnectionState::Closed);
        info!("live channel closed");
    }

    /// One attempt: WebSocket upgrade, Engine.IO open, namespace connect.
    async fn connect(&self) -> Result<(Socket, Duration), LiveError> {
        let token = self.tokens.bearer_token();
        let url = frame::endpoint(&self.settings.url, &self.settings.path)?;
        let mut request = url.into_client_request()?;
        if let Some(token) = &token {
            let value = HeaderValue::from_str(&bearer(token))
                .map_err(|e| LiveError::Protocol(format!("token is not a valid header: {}", e)))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (mut socket, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| LiveError::Timeout)??;
        let namespace = self.settings.namespace.as_str();
        let outcome = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            handshake(&mut socket, namespace, token.as_deref()),
        )
        .await;
        match outcome {
            Ok(Ok(open)) => Ok((socket, open.heartbeat())),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LiveError::Timeout),
        }
    }

    /// Pumps frames until the connection ends or a command arrives. Any frame
    /// from the server (pings included) re-arms the `heartbeat` deadline.
    async fn serve(&mut self, mut socket: Socket, heartbeat: Duration) -> SessionEnd {
        let deadline = tokio::time::sleep(heartbeat);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!("no frame from the server within {:?}", heartbeat);
                    let _ = socket.close(None).await;
                    return SessionEnd::Dropped(LiveError::Timeout);
                }
                message = socket.next() => {
                    deadline.as_mut().reset(Instant::now() + heartbeat);
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Dropped(LiveError::Closed("closed by server".into()))
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return SessionEnd::Dropped(e.into()),
                    };
                    if let Err(e) = self.handle_frame(&mut socket, &text).await {
                        return SessionEnd::Dropped(e);
                    }
                }
                command = self.commands.recv() => {
                    let _ = socket.close(None).await;
                    return match command {
                        Some(Command::Reconnect) => SessionEnd::Reconnect,
                        Some(Command::Shutdown) | None => SessionEnd::Shutdown,
                    };
                }
            }
        }
    }

    async fn handle_frame(&self, socket: &mut Socket, text: &str) -> Result<(), LiveError> {
        match frame::decode(text) {
            Ok(Packet::Ping) => socket.send(Message::Text(frame::PONG.to_string())).await?,
            Ok(Packet::Close) => return Err(LiveError::Closed("engine close packet".into())),
            Ok(Packet::Disconnect { namespace }) if namespace == self.settings.namespace => {
                return Err(LiveError::Closed("namespace disconnected".into()))
            }
            Ok(Packet::Event {
                namespace,
                name,
                args,
            }) if namespace == self.settings.namespace => self.dispatch(&name, args),
            Ok(other) => debug!("ignoring {:?}", other),
            Err(e) => warn!("undecodable live frame '{}': {}", text, e),
        }
        Ok(())
    }

    fn dispatch(&self, name: &str, args: Vec<serde_json::Value>) {
        let Some(kind) = BookingEventKind::from_event_name(name) else {
            debug!("ignoring live event '{}'", name);
            return;
        };
        let Some(payload) = args.into_iter().next() else {
            warn!("live event '{}' without payload", name);
            return;
        };
        match serde_json::from_value::<BookingEventPayload>(payload) {
            Ok(payload) => {
                debug!("live event {} for booking {}", name, payload.id);
                let _ = self.events.send(BookingEvent { kind, payload });
            }
            Err(e) => warn!("malformed '{}' payload: {}", name, e),
        }
    }
}

/// Waits for the Engine.IO open packet, joins `namespace` with the token and
/// waits for the server's verdict.
async fn handshake(
    socket: &mut Socket,
    namespace: &str,
    token: Option<&str>,
) -> Result<OpenInfo, LiveError> {
    let mut opened: Option<OpenInfo> = None;
    loop {
        let text = match socket.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(LiveError::Closed("closed during handshake".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };
        match frame::decode(&text)? {
            Packet::Open(info) if opened.is_none() => {
                debug!("engine session {} opened", info.sid);
                opened = Some(info);
                socket
                    .send(Message::Text(frame::encode_connect(namespace, token)))
                    .await?;
            }
            Packet::Ping => socket.send(Message::Text(frame::PONG.to_string())).await?,
            Packet::Connect { namespace: ns } if ns == namespace => {
                return opened
                    .ok_or_else(|| LiveError::Protocol("namespace joined before open".into()))
            }
            Packet::ConnectError { namespace: ns, message } if ns == namespace => {
                return Err(LiveError::Rejected(message))
            }
            Packet::Close => return Err(LiveError::Closed("closed during handshake".into())),
            other => debug!("ignoring {:?} during handshake", other),
        }
    }
}
