//! Transport connectors for the notification server.
//!
//! Connectors own the wire. Everything they receive is normalized into
//! `TransportSignal`s before the router sees it.

pub mod websocket;

pub use websocket::{NotificationSocket, TransportError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::events::{OutboundFrame, TransportSignal};
use crate::kitchens::KitchenName;

/// Starts a transport task for one kitchen.
///
/// The returned task is the subscription: aborting it unsubscribes.
pub trait TransportFactory: Send {
    fn spawn(
        &self,
        kitchen: &KitchenName,
        signal_tx: mpsc::Sender<TransportSignal>,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
    ) -> JoinHandle<()>;
}

/// Spawns a [`NotificationSocket`] per subscription.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    server_url: String,
    options: TransportConfig,
}

impl WebSocketTransport {
    pub fn new(server_url: String, options: TransportConfig) -> Self {
        Self {
            server_url,
            options,
        }
    }
}

impl TransportFactory for WebSocketTransport {
    fn spawn(
        &self,
        kitchen: &KitchenName,
        signal_tx: mpsc::Sender<TransportSignal>,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
    ) -> JoinHandle<()> {
        let socket = NotificationSocket::new(
            kitchen.clone(),
            self.server_url.clone(),
            self.options.clone(),
            signal_tx,
        );
        tokio::spawn(socket.run(outbound_rx))
    }
}
