//! Signals exchanged between the transport and the router.

use serde_json::Value;

/// Everything a transport can deliver to the router.
///
/// This is a closed set: the router matches on it exhaustively instead of
/// registering handlers by event name.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Connection established; `id` identifies this connection.
    Connect { id: String },

    /// Connection lost.
    Disconnect { reason: String },

    /// The transport is about to retry (1-based attempt number).
    ReconnectAttempt(u32),

    /// A retry succeeded after `n` attempts.
    Reconnect(u32),

    /// A connection attempt failed.
    ConnectError(String),

    /// A named domain event with its raw payload.
    Order { event_name: String, payload: Value },

    /// Acknowledgment of a liveness probe.
    Pong,
}

/// Frames the router side asks the transport to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Application-level liveness probe.
    Probe,
}
