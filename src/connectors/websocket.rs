//! WebSocket transport for the notification server.
//!
//! Key responsibilities:
//! 1. Connect with the kitchen key in the query string
//! 2. Reconnect with doubling backoff, capped, for a bounded number of attempts
//! 3. Normalize frames into `TransportSignal`s
//! 4. Send liveness probes on request
//!
//! The router only sees the signals; it never touches the socket.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::events::{OutboundFrame, TransportSignal};
use crate::kitchens::KitchenName;

/// Client type announced to the server.
const CLIENT_TYPE: &str = "kitchen_frontend_app";

/// Event names reserved for the liveness probe exchange.
const PROBE_EVENT: &str = "ping";
const ACK_EVENT: &str = "pong";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0}ms")]
    Timeout(u128),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection closed by server: {0}")]
    ServerClosed(String),

    #[error("Stream ended")]
    StreamEnded,

    #[error("Closed by client")]
    ClientClosed,
}

impl TransportError {
    /// Disconnect reason reported to the router.
    pub fn disconnect_reason(&self) -> &'static str {
        match self {
            TransportError::ServerClosed(_) => "io server disconnect",
            TransportError::StreamEnded => "transport close",
            TransportError::ClientClosed => "io client disconnect",
            _ => "transport error",
        }
    }
}

/// Inbound frame shape: `{"event": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Outbound frame shape.
#[derive(Debug, Serialize)]
struct WireOutbound<'a> {
    event: &'a str,
}

/// WebSocket transport bound to one kitchen.
pub struct NotificationSocket {
    kitchen: KitchenName,
    server_url: String,
    options: TransportConfig,
    connection: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    signal_tx: mpsc::Sender<TransportSignal>,
}

impl NotificationSocket {
    pub fn new(
        kitchen: KitchenName,
        server_url: String,
        options: TransportConfig,
        signal_tx: mpsc::Sender<TransportSignal>,
    ) -> Self {
        Self {
            kitchen,
            server_url,
            options,
            connection: None,
            signal_tx,
        }
    }

    /// Server URL with the client type and kitchen key appended.
    pub fn connect_url(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.server_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{} ({})", self.server_url, e)))?;
        url.query_pairs_mut()
            .append_pair("type", CLIENT_TYPE)
            .append_pair("KitchenName", self.kitchen.as_str());
        Ok(url)
    }

    /// Opens a connection and returns its id.
    pub async fn connect(&mut self) -> Result<String, TransportError> {
        let url = self.connect_url()?;
        info!("[{}] Connecting to {}", self.kitchen, url);

        let timeout = self.options.connect_timeout;
        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(timeout.as_millis()))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        self.connection = Some(ws_stream);
        let id = Uuid::new_v4().to_string();
        info!("[{}] Connected (id={})", self.kitchen, id);
        Ok(id)
    }

    /// Sends an outbound frame on the open connection.
    pub async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("Not connected".to_string()))?;

        let text = encode_frame(frame)?;
        conn.send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        debug!("[{}] Sent {:?}", self.kitchen, frame);
        Ok(())
    }

    /// Runs the transport until the host drops its channels or the retry
    /// budget is exhausted.
    ///
    /// Emits `Connect`/`Disconnect`/`ConnectError` for every connection and
    /// `ReconnectAttempt(n)` before each retry, followed by `Reconnect(n)`
    /// when a retry succeeds.
    pub async fn run(mut self, mut outbound_rx: mpsc::Receiver<OutboundFrame>) {
        info!("[{}] NotificationSocket starting", self.kitchen);

        // 0 = initial connection, n > 0 = n-th retry.
        let mut attempt: u32 = 0;

        loop {
            if self.signal_tx.is_closed() {
                debug!("[{}] Signal receiver dropped", self.kitchen);
                break;
            }

            if attempt > 0 {
                if self.options.attempts_exhausted(attempt) {
                    error!(
                        "[{}] Giving up after {} reconnection attempts",
                        self.kitchen,
                        attempt - 1
                    );
                    break;
                }

                let backoff = self.options.backoff_for(attempt);
                debug!(
                    "[{}] Waiting {}ms before reconnection attempt #{}",
                    self.kitchen,
                    backoff.as_millis(),
                    attempt
                );
                tokio::time::sleep(backoff).await;
                self.emit(TransportSignal::ReconnectAttempt(attempt)).await;
            }

            match self.connect().await {
                Ok(id) => {
                    self.emit(TransportSignal::Connect { id }).await;
                    if attempt > 0 {
                        self.emit(TransportSignal::Reconnect(attempt)).await;
                    }

                    let cause = self.run_until_disconnect(&mut outbound_rx).await;
                    self.close().await;

                    if matches!(cause, TransportError::ClientClosed) {
                        break;
                    }

                    warn!("[{}] Connection lost: {}", self.kitchen, cause);
                    self.emit(TransportSignal::Disconnect {
                        reason: cause.disconnect_reason().to_string(),
                    })
                    .await;
                    attempt = 1;
                }
                Err(e) => {
                    error!("[{}] {}", self.kitchen, e);
                    self.emit(TransportSignal::ConnectError(e.to_string())).await;
                    if matches!(e, TransportError::InvalidUrl(_)) {
                        break;
                    }
                    attempt += 1;
                }
            }
        }

        self.close().await;
        info!("[{}] NotificationSocket stopped", self.kitchen);
    }

    /// Pumps the open connection until it fails. Always returns the cause.
    async fn run_until_disconnect(
        &mut self,
        outbound_rx: &mut mpsc::Receiver<OutboundFrame>,
    ) -> TransportError {
        loop {
            let conn = match self.connection.as_mut() {
                Some(conn) => conn,
                None => return TransportError::ConnectionFailed("No connection".to_string()),
            };

            tokio::select! {
                msg_result = conn.next() => {
                    match msg_result {
                        Some(Ok(msg)) => {
                            if let Err(e) = self.handle_message(msg).await {
                                return e;
                            }
                        }
                        Some(Err(e)) => {
                            return TransportError::ReceiveFailed(e.to_string());
                        }
                        None => return TransportError::StreamEnded,
                    }
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if let Err(e) = self.send_frame(frame).await {
                                return e;
                            }
                        }
                        None => return TransportError::ClientClosed,
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) -> Result<(), TransportError> {
        match msg {
            Message::Text(text) => {
                if let Some(signal) = parse_frame(&text) {
                    self.emit(signal).await;
                } else {
                    debug!("[{}] Ignoring frame: {}", self.kitchen, text);
                }
            }
            Message::Ping(_) => {
                // tungstenite queues the pong and flushes it on the next read.
                debug!("[{}] Received Ping frame", self.kitchen);
            }
            Message::Pong(_) => {
                debug!("[{}] Received Pong frame", self.kitchen);
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                return Err(TransportError::ServerClosed(reason));
            }
            Message::Binary(_) => {
                debug!("[{}] Received binary message (ignored)", self.kitchen);
            }
            Message::Frame(_) => {}
        }

        Ok(())
    }

    async fn emit(&self, signal: TransportSignal) {
        if self.signal_tx.send(signal).await.is_err() {
            debug!("[{}] Signal dropped: receiver closed", self.kitchen);
        }
    }

    /// Gracefully closes the connection, if open.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            let _ = conn.close(None).await;
            debug!("[{}] WebSocket closed", self.kitchen);
        }
    }
}

/// Normalizes one text frame. Returns `None` for frames the router has no
/// use for (unparseable text, outbound-only events).
fn parse_frame(text: &str) -> Option<TransportSignal> {
    if text.trim().eq_ignore_ascii_case(ACK_EVENT) {
        return Some(TransportSignal::Pong);
    }

    let wire: WireEvent = serde_json::from_str(text).ok()?;
    match wire.event.as_str() {
        ACK_EVENT => Some(TransportSignal::Pong),
        PROBE_EVENT => None,
        _ => Some(TransportSignal::Order {
            event_name: wire.event,
            payload: wire.data,
        }),
    }
}

fn encode_frame(frame: OutboundFrame) -> Result<String, TransportError> {
    let event = match frame {
        OutboundFrame::Probe => PROBE_EVENT,
    };
    serde_json::to_string(&WireOutbound { event })
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

impl std::fmt::Debug for NotificationSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSocket")
            .field("kitchen", &self.kitchen)
            .field("server_url", &self.server_url)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
