//! Connection state tracking.
//!
//! The transport owns retries and disconnect detection. This module only
//! mirrors the lifecycle signals it has already emitted into a status value
//! and a human-readable log line.

use std::fmt;

use crate::events::TransportSignal;

/// Reason recorded when a router is created.
pub const INITIAL_REASON: &str = "initial";

/// Reason recorded when the host tears a subscription down.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Connection status as observed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected(String),
    Connecting,
    Connected,
    Reconnecting(u32),
    Error(String),
}

impl ConnectionStatus {
    /// Status of a freshly created router.
    pub fn initial() -> Self {
        ConnectionStatus::Disconnected(INITIAL_REASON.to_string())
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected(reason) => write!(f, "Disconnected: {}", reason),
            ConnectionStatus::Connecting => f.write_str("Connecting"),
            ConnectionStatus::Connected => f.write_str("Connected"),
            ConnectionStatus::Reconnecting(n) => write!(f, "Reconnecting (attempt #{})", n),
            ConnectionStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Result of feeding one lifecycle signal to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionStatus,
    pub log: String,
    /// False when `next` equals the status the signal was applied to.
    pub changed: bool,
}

/// Computes the next status for a lifecycle signal.
///
/// Returns `None` for domain signals (orders, pongs), which never affect
/// connection status.
pub fn transition(current: &ConnectionStatus, signal: &TransportSignal) -> Option<Transition> {
    let (next, log) = match signal {
        TransportSignal::Connect { id } => {
            (ConnectionStatus::Connected, format!("Connected (id={})", id))
        }
        TransportSignal::Disconnect { reason } => (
            ConnectionStatus::Disconnected(reason.clone()),
            format!("Disconnected: {}", reason),
        ),
        TransportSignal::ReconnectAttempt(n) => (
            ConnectionStatus::Reconnecting(*n),
            format!("Reconnection attempt #{}", n),
        ),
        TransportSignal::Reconnect(_) => (
            ConnectionStatus::Connected,
            "Reconnected successfully".to_string(),
        ),
        TransportSignal::ConnectError(msg) => (
            ConnectionStatus::Error(msg.clone()),
            format!("Connection error: {}", msg),
        ),
        TransportSignal::Order { .. } | TransportSignal::Pong => return None,
    };

    let changed = &next != current;
    Some(Transition { next, log, changed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(id: &str) -> TransportSignal {
        TransportSignal::Connect { id: id.to_string() }
    }

    fn disconnect(reason: &str) -> TransportSignal {
        TransportSignal::Disconnect {
            reason: reason.to_string(),
        }
    }

    /// Replays signals the way the router does and returns the final status.
    fn replay(signals: &[TransportSignal]) -> ConnectionStatus {
        signals.iter().fold(ConnectionStatus::initial(), |status, signal| {
            transition(&status, signal).map(|t| t.next).unwrap_or(status)
        })
    }

    #[test]
    fn test_connect_logs_id() {
        let t = transition(&ConnectionStatus::initial(), &connect("abc")).unwrap();
        assert_eq!(t.next, ConnectionStatus::Connected);
        assert_eq!(t.log, "Connected (id=abc)");
        assert!(t.changed);
    }

    #[test]
    fn test_disconnect_records_reason() {
        let t = transition(&ConnectionStatus::Connected, &disconnect("transport close")).unwrap();
        assert_eq!(t.next, ConnectionStatus::Disconnected("transport close".to_string()));
        assert_eq!(t.log, "Disconnected: transport close");
    }

    #[test]
    fn test_reconnect_attempt_and_success() {
        let t = transition(
            &ConnectionStatus::Disconnected("ping timeout".into()),
            &TransportSignal::ReconnectAttempt(3),
        )
        .unwrap();
        assert_eq!(t.next, ConnectionStatus::Reconnecting(3));
        assert_eq!(t.log, "Reconnection attempt #3");

        let t = transition(&t.next, &TransportSignal::Reconnect(3)).unwrap();
        assert_eq!(t.next, ConnectionStatus::Connected);
        assert_eq!(t.log, "Reconnected successfully");
    }

    #[test]
    fn test_connect_error_is_recoverable() {
        let status = replay(&[
            TransportSignal::ConnectError("timeout".into()),
            connect("second"),
        ]);
        assert_eq!(status, ConnectionStatus::Connected);

        let t = transition(
            &ConnectionStatus::Connecting,
            &TransportSignal::ConnectError("timeout".into()),
        )
        .unwrap();
        assert_eq!(t.next, ConnectionStatus::Error("timeout".to_string()));
        assert_eq!(t.log, "Connection error: timeout");
    }

    #[test]
    fn test_repeated_signal_is_not_a_change() {
        let t = transition(&ConnectionStatus::Connected, &connect("again")).unwrap();
        assert!(!t.changed);
        assert_eq!(t.log, "Connected (id=again)");
    }

    #[test]
    fn test_domain_signals_are_ignored() {
        assert!(transition(&ConnectionStatus::Connected, &TransportSignal::Pong).is_none());
    }

    #[test]
    fn test_replay_ends_on_last_transition() {
        let sequences: Vec<(Vec<TransportSignal>, ConnectionStatus)> = vec![
            (
                vec![connect("a"), disconnect("io server disconnect")],
                ConnectionStatus::Disconnected("io server disconnect".into()),
            ),
            (
                vec![
                    disconnect("x"),
                    TransportSignal::ReconnectAttempt(1),
                    TransportSignal::ReconnectAttempt(2),
                ],
                ConnectionStatus::Reconnecting(2),
            ),
            (
                vec![connect("a"), TransportSignal::ConnectError("boom".into())],
                ConnectionStatus::Error("boom".into()),
            ),
            (
                vec![
                    TransportSignal::ReconnectAttempt(1),
                    TransportSignal::Pong,
                    TransportSignal::Reconnect(1),
                ],
                ConnectionStatus::Connected,
            ),
            (vec![], ConnectionStatus::initial()),
        ];

        for (signals, expected) in sequences {
            assert_eq!(replay(&signals), expected, "sequence: {:?}", signals);
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::initial().to_string(), "Disconnected: initial");
        assert_eq!(ConnectionStatus::Reconnecting(4).to_string(), "Reconnecting (attempt #4)");
        assert_eq!(ConnectionStatus::Error("refused".into()).to_string(), "Error: refused");
    }
}
