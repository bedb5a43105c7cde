//! Push channel transport client.
//!
//! Maintains at most one live push connection per session and surfaces
//! inbound events on a multicast stream. Late subscribers get no replay;
//! current state must be fetched through the REST client instead.

use crate::state::notification::{Notification, WireNotification};
use crate::state::ConnectionStatus;
use futures_util::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Capacity of the multicast stream. A consumer that lags behind this many
/// events observes a `Lagged` gap and should backfill through REST.
const INCOMING_CHANNEL_CAPACITY: usize = 256;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured URL cannot form a handshake request.
    #[error("invalid handshake request")]
    InvalidRequest(#[source] tokio_tungstenite::tungstenite::Error),
    /// The token contains bytes not allowed in a header value.
    #[error("access token is not a valid header value")]
    InvalidToken,
    /// Connection or protocol failure.
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Settings of the push channel.
#[derive(Debug, Clone)]
pub struct PushChannelConfig {
    /// WebSocket endpoint of the push channel.
    pub url: String,
    /// Per-user private destination to subscribe after the handshake.
    pub destination: String,
    /// Persisted session storage read when no token is supplied.
    pub token_file: Option<PathBuf>,
    /// Fixed delay before reconnecting after an unexpected closure.
    pub reconnect_delay: Duration,
    /// Keepalive interval, exchanged in both directions.
    pub heartbeat: Duration,
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            destination: "/user/queue/notifications".to_string(),
            token_file: None,
            reconnect_delay: Duration::from_secs(5),
            heartbeat: Duration::from_secs(10),
        }
    }
}

/// Client of the push channel.
///
/// One instance per authenticated session; any number of presentation
/// controllers may share it read-only through [`PushClient::subscribe`]
/// and [`PushClient::status`].
pub struct PushClient {
    config: PushChannelConfig,
    incoming: broadcast::Sender<Notification>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    connecting: Arc<AtomicBool>,
    attempts: AtomicU64,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PushClient {
    pub fn new(config: PushChannelConfig) -> Self {
        let (incoming, _) = broadcast::channel(INCOMING_CHANNEL_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            incoming,
            status: Arc::new(status),
            connecting: Arc::new(AtomicBool::new(false)),
            attempts: AtomicU64::new(0),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    /// Multicast stream of normalized inbound notifications.
    ///
    /// Every subscriber present at emission time receives the value; there
    /// is no replay for late subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.incoming.subscribe()
    }

    /// Continuously-updated connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Number of connection series started so far. Each series covers the
    /// automatic reconnect attempts of one worker.
    pub fn connection_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Idempotent connect: a no-op when a connection is active or an
    /// attempt is in flight. The token falls back to the persisted session
    /// storage, then to empty.
    pub fn ensure_connected(&self, token: Option<&str>) {
        if self.is_connected() || self.connecting.load(Ordering::SeqCst) {
            return;
        }
        let token = token
            .map(str::to_string)
            .or_else(|| stored_token(self.config.token_file.as_deref()))
            .unwrap_or_default();
        self.connect(token);
    }

    /// Raw connect. Spawns one background worker that owns the socket,
    /// reconnects with a fixed delay and pumps inbound messages onto the
    /// multicast stream. Never blocks the caller.
    pub fn connect(&self, token: String) {
        let mut worker = lock_ignoring_poison(&self.worker);
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        self.connecting.store(true, Ordering::SeqCst);
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown.send(false);

        let driver = ConnectionWorker {
            config: self.config.clone(),
            token,
            incoming: self.incoming.clone(),
            status: self.status.clone(),
            connecting: self.connecting.clone(),
            shutdown: self.shutdown.subscribe(),
        };
        *worker = Some(tokio::spawn(driver.run()));
    }

    /// Tears the connection down. Safe to call multiple times, including
    /// when no connection was ever established.
    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = lock_ignoring_poison(&self.worker).take() {
            handle.abort();
        }
        self.connecting.store(false, Ordering::SeqCst);
        let _ = self.status.send(ConnectionStatus::Disconnected);
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// How one established connection ended.
enum ConnectionEnd {
    /// Orderly shutdown, no reconnect.
    Shutdown,
    /// Unexpected closure, reconnect after the fixed delay.
    Dropped,
}

/// Background task owning the socket for one connection series.
struct ConnectionWorker {
    config: PushChannelConfig,
    token: String,
    incoming: broadcast::Sender<Notification>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    connecting: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionWorker {
    async fn run(mut self) {
        let connection_id = Uuid::new_v4();
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.connect_once(connection_id).await {
                Ok(ConnectionEnd::Shutdown) => break,
                Ok(ConnectionEnd::Dropped) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        "Push channel closed, reconnecting"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = ?err,
                        "Push channel failure"
                    );
                }
            }
            self.connecting.store(false, Ordering::SeqCst);
            let _ = self.status.send(ConnectionStatus::Disconnected);

            // Fixed reconnect delay, no exponential backoff.
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.connecting.store(false, Ordering::SeqCst);
        let _ = self.status.send(ConnectionStatus::Disconnected);
    }

    async fn connect_once(&mut self, connection_id: Uuid) -> Result<ConnectionEnd, TransportError> {
        let request = build_handshake_request(&self.config.url, &self.token)?;
        let (mut stream, _) = connect_async(request).await?;

        tracing::info!(
            connection_id = %connection_id,
            "Push channel connected"
        );
        let _ = self.status.send(ConnectionStatus::Connected);
        self.connecting.store(false, Ordering::SeqCst);

        // (Re)subscribe the private destination; the server replaces any
        // prior subscription of this session.
        let subscribe = serde_json::json!({ "subscribe": self.config.destination });
        stream.send(Message::Text(subscribe.to_string())).await?;

        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.reset();

        let shutdown = &mut self.shutdown;
        let incoming = &self.incoming;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = stream.send(Message::Close(None)).await;
                        return Ok(ConnectionEnd::Shutdown);
                    }
                }
                _ = heartbeat.tick() => {
                    stream.send(Message::Ping(Vec::new())).await?;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(body))) => publish_frame(incoming, &body),
                    Some(Ok(Message::Ping(payload))) => {
                        stream.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Dropped),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        }
    }
}

/// Decodes one inbound frame. A message that fails to decode is logged
/// and dropped; it does not affect the connection.
fn publish_frame(incoming: &broadcast::Sender<Notification>, body: &str) {
    match serde_json::from_str::<WireNotification>(body) {
        Ok(wire) => {
            let notification = Notification::from_wire(wire);
            tracing::debug!(id = notification.id, "Push notification received");
            // No receivers is fine, the value is simply discarded.
            let _ = incoming.send(notification);
        }
        Err(err) => {
            tracing::warn!(error = ?err, body, "Dropping undecodable push message");
        }
    }
}

/// Builds the handshake request: token as a query parameter when
/// non-empty, plus the bearer authorization header.
fn build_handshake_request(url: &str, token: &str) -> Result<Request, TransportError> {
    let url = if token.is_empty() {
        url.to_string()
    } else {
        format!("{url}?token={}", utf8_percent_encode(token, NON_ALPHANUMERIC))
    };
    let mut request = url
        .into_client_request()
        .map_err(TransportError::InvalidRequest)?;
    if !token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

/// Reads the access token from the persisted session storage, if any.
fn stored_token(path: Option<&Path>) -> Option<String> {
    let raw = std::fs::read_to_string(path?).ok()?;
    let token = raw.trim().to_string();
    (!token.is_empty()).then_some(token)
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> PushClient {
        PushClient::new(PushChannelConfig {
            url: "ws://127.0.0.1:9".to_string(),
            reconnect_delay: Duration::from_secs(60),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn ensure_connected_is_idempotent() {
        let client = unreachable_client();
        client.ensure_connected(Some("token"));
        client.ensure_connected(Some("token"));
        client.ensure_connected(None);
        assert_eq!(client.connection_attempts(), 1);
        client.disconnect();
    }

    #[tokio::test]
    async fn disconnect_is_safe_to_repeat() {
        let client = unreachable_client();
        client.disconnect();
        client.ensure_connected(Some("token"));
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn reconnect_after_disconnect_starts_a_new_series() {
        let client = unreachable_client();
        client.ensure_connected(Some("token"));
        client.disconnect();
        client.ensure_connected(Some("token"));
        assert_eq!(client.connection_attempts(), 2);
        client.disconnect();
    }

    #[tokio::test]
    async fn status_starts_disconnected() {
        let client = unreachable_client();
        assert!(!client.is_connected());
        assert_eq!(*client.status().borrow(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn handshake_request_embeds_the_token() {
        let request = build_handshake_request("ws://localhost:8080/ws", "abc123").unwrap();
        assert!(request.uri().to_string().contains("token=abc123"));
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn handshake_request_encodes_reserved_token_characters() {
        let request = build_handshake_request("ws://localhost:8080/ws", "a+b/c=").unwrap();
        assert!(request.uri().to_string().contains("token=a%2Bb%2Fc%3D"));
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer a+b/c="
        );
    }

    #[test]
    fn handshake_request_without_token_has_no_header() {
        let request = build_handshake_request("ws://localhost:8080/ws", "").unwrap();
        assert!(!request.uri().to_string().contains("token="));
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn stored_token_trims_and_rejects_empty() {
        let path = std::env::temp_dir().join(format!("hr-notify-token-{}", Uuid::new_v4()));
        std::fs::write(&path, "  secret \n").unwrap();
        assert_eq!(stored_token(Some(&path)), Some("secret".to_string()));

        std::fs::write(&path, "   \n").unwrap();
        assert_eq!(stored_token(Some(&path)), None);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(stored_token(Some(&path)), None);
        assert_eq!(stored_token(None), None);
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped_without_panic() {
        let client = unreachable_client();
        let mut rx = client.subscribe();
        publish_frame(&client.incoming, "not json at all");
        assert!(rx.try_recv().is_err());

        publish_frame(
            &client.incoming,
            r#"{"id": 42, "type": "DEMANDE_VALIDEE", "statut": "NON_LU"}"#,
        );
        let received = rx.try_recv().unwrap();
        assert_eq!(received.id, 42);
    }
}
