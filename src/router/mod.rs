//! Order event router.
//!
//! Owns the connection status, the log trail and the heartbeat for one
//! kitchen subscription. Everything the transport delivers enters through
//! [`OrderEventRouter::handle`]; everything the host needs leaves through
//! the [`RouterOutput`] channel. The router never blocks and never waits for
//! the host to act on an output.

mod classifier;
mod connection;
mod heartbeat;

pub use classifier::{classify, PENDING_STATUS, REFETCH_STATUSES};
pub use connection::{
    transition, ConnectionStatus, Transition, CLIENT_DISCONNECT_REASON, INITIAL_REASON,
};
pub use heartbeat::{
    HeartbeatMonitor, HeartbeatTick, DEFAULT_HEARTBEAT_INTERVAL, MIN_HEARTBEAT_INTERVAL,
};

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{LogEntry, OrderEvent, OutboundFrame, RoutingDecision, TransportSignal};
use crate::kitchens::KitchenName;

/// Entries kept in the in-memory log trail; older entries are evicted.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Already subscribed to kitchen {current}, cannot subscribe to {requested} without teardown")]
    SubscriptionConflict {
        current: KitchenName,
        requested: KitchenName,
    },
}

/// What the router reports to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterOutput {
    /// Emitted once per status transition.
    StatusChanged(ConnectionStatus),

    /// Emitted exactly once per order event received for the subscribed kitchen.
    Decision {
        kitchen: KitchenName,
        order_id: Option<String>,
        decision: RoutingDecision,
    },

    /// Emitted for every entry appended to the log trail.
    Log(LogEntry),
}

/// Event router for a single kitchen subscription.
pub struct OrderEventRouter {
    kitchen: Option<KitchenName>,
    status: ConnectionStatus,
    logs: VecDeque<LogEntry>,
    log_capacity: usize,
    heartbeat: HeartbeatMonitor,
    output_tx: mpsc::UnboundedSender<RouterOutput>,
    fixed_today: Option<NaiveDate>,
}

impl OrderEventRouter {
    /// Creates an unsubscribed router in the initial `Disconnected` state.
    ///
    /// Heartbeat ticks are delivered on `tick_tx`; the owner feeds them back
    /// through [`OrderEventRouter::on_heartbeat_tick`].
    pub fn new(
        heartbeat_interval: Duration,
        output_tx: mpsc::UnboundedSender<RouterOutput>,
        tick_tx: mpsc::Sender<HeartbeatTick>,
    ) -> Self {
        Self {
            kitchen: None,
            status: ConnectionStatus::initial(),
            logs: VecDeque::new(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            heartbeat: HeartbeatMonitor::new(heartbeat_interval, tick_tx),
            output_tx,
            fixed_today: None,
        }
    }

    /// Pins "today" instead of reading the local clock.
    pub fn with_fixed_date(mut self, today: NaiveDate) -> Self {
        self.pin_date(today);
        self
    }

    /// Caps the log trail at `capacity` entries (at least one).
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        while self.logs.len() > self.log_capacity {
            self.logs.pop_front();
        }
        self
    }

    pub fn pin_date(&mut self, today: NaiveDate) {
        self.fixed_today = Some(today);
    }

    pub fn kitchen(&self) -> Option<&KitchenName> {
        self.kitchen.as_ref()
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// The most recent log entries, oldest first. Every entry is also
    /// streamed as [`RouterOutput::Log`].
    pub fn logs(&self) -> &VecDeque<LogEntry> {
        &self.logs
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// The date same-day alerts are compared against.
    pub fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Binds the router to a kitchen.
    ///
    /// Subscribing to the current kitchen again is a no-op. Subscribing to a
    /// different kitchen requires [`OrderEventRouter::teardown`] first.
    pub fn subscribe(&mut self, kitchen: KitchenName) -> Result<(), RouterError> {
        match &self.kitchen {
            Some(current) if *current == kitchen => return Ok(()),
            Some(current) => {
                return Err(RouterError::SubscriptionConflict {
                    current: current.clone(),
                    requested: kitchen,
                });
            }
            None => {}
        }

        info!("[{}] Subscribing", kitchen);
        self.append_log(format!("Subscribing to kitchen {}", kitchen));
        self.kitchen = Some(kitchen);
        self.set_status(ConnectionStatus::Connecting);
        Ok(())
    }

    /// Releases the subscription: cancels the heartbeat and marks the
    /// connection closed by the client. Idempotent.
    pub fn teardown(&mut self) {
        self.heartbeat.stop();

        if let Some(kitchen) = self.kitchen.take() {
            info!("[{}] Unsubscribed", kitchen);
            self.append_log(format!("Unsubscribed from kitchen {}", kitchen));
            self.set_status(ConnectionStatus::Disconnected(
                CLIENT_DISCONNECT_REASON.to_string(),
            ));
        }
    }

    /// Processes one signal from the transport, in arrival order.
    pub fn handle(&mut self, signal: TransportSignal) {
        let Some(kitchen) = self.kitchen.clone() else {
            debug!("Ignoring signal while unsubscribed: {:?}", signal);
            return;
        };

        match signal {
            TransportSignal::Order { event_name, payload } => {
                if event_name != kitchen.as_str() {
                    debug!("[{}] Ignoring event for {}", kitchen, event_name);
                    return;
                }
                self.handle_order(&kitchen, payload);
            }
            TransportSignal::Pong => {
                debug!("[{}] Pong received", kitchen);
                self.append_log("Pong received");
            }
            lifecycle => self.handle_lifecycle(&kitchen, &lifecycle),
        }
    }

    /// Turns a heartbeat tick into a probe, if it is still wanted.
    ///
    /// Ticks from a stopped timer, or arriving while not connected, are
    /// dropped so that no probe follows a disconnect.
    pub fn on_heartbeat_tick(&mut self, tick: HeartbeatTick) -> Option<OutboundFrame> {
        if !self.heartbeat.is_current(tick) || !self.status.is_connected() {
            debug!("Dropping stale heartbeat tick #{}", tick.generation);
            return None;
        }

        self.append_log("Ping sent");
        Some(OutboundFrame::Probe)
    }

    fn handle_lifecycle(&mut self, kitchen: &KitchenName, signal: &TransportSignal) {
        let Some(step) = transition(&self.status, signal) else {
            return;
        };

        if matches!(step.next, ConnectionStatus::Error(_)) {
            warn!("[{}] {}", kitchen, step.log);
        } else {
            info!("[{}] {}", kitchen, step.log);
        }

        self.append_log(step.log);
        if step.changed {
            self.set_status(step.next);
        }
    }

    fn handle_order(&mut self, kitchen: &KitchenName, payload: Value) {
        let event = OrderEvent::from_payload(payload);
        self.append_log(format!("Received order: {}", event.raw_payload()));

        if let Err(e) = event.validate() {
            warn!("[{}] Malformed order event: {}", kitchen, e);
            self.append_log(format!("Malformed order event: {}", e));
        }

        let decision = classify(&event, self.today());
        debug!(
            "[{}] Order {} ({}) -> {}",
            kitchen,
            event.order_id().unwrap_or("?"),
            event.internal_order_status().unwrap_or("no status"),
            decision.kind()
        );

        self.emit(RouterOutput::Decision {
            kitchen: kitchen.clone(),
            order_id: event.order_id().map(str::to_string),
            decision,
        });
    }

    fn set_status(&mut self, next: ConnectionStatus) {
        if next == self.status {
            return;
        }
        self.status = next;

        if self.status.is_connected() {
            self.heartbeat.start();
        } else {
            self.heartbeat.stop();
        }

        self.emit(RouterOutput::StatusChanged(self.status.clone()));
    }

    fn append_log(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        // Wall clock may step backwards; the trail must not.
        let timestamp = match self.logs.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let entry = LogEntry::new(timestamp, message);
        if self.logs.len() == self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(entry.clone());
        self.emit(RouterOutput::Log(entry));
    }

    fn emit(&self, output: RouterOutput) {
        if self.output_tx.send(output).is_err() {
            debug!("Router output dropped: host receiver closed");
        }
    }
}

impl std::fmt::Debug for OrderEventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEventRouter")
            .field("kitchen", &self.kitchen)
            .field("status", &self.status)
            .field("log_entries", &self.logs.len())
            .field("heartbeat", &self.heartbeat)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PERIOD: Duration = Duration::from_secs(30);

    struct Harness {
        router: OrderEventRouter,
        output_rx: mpsc::UnboundedReceiver<RouterOutput>,
        tick_rx: mpsc::Receiver<HeartbeatTick>,
    }

    impl Harness {
        fn new() -> Self {
            let (output_tx, output_rx) = mpsc::unbounded_channel();
            let (tick_tx, tick_rx) = mpsc::channel(16);
            let router = OrderEventRouter::new(PERIOD, output_tx, tick_tx)
                .with_fixed_date(NaiveDate::from_ymd_opt(2024, 11, 30).unwrap());
            Self {
                router,
                output_rx,
                tick_rx,
            }
        }

        fn subscribed(name: &str) -> Self {
            let mut h = Self::new();
            h.router.subscribe(kitchen(name)).unwrap();
            h.outputs();
            h
        }

        fn outputs(&mut self) -> Vec<RouterOutput> {
            let mut out = Vec::new();
            while let Ok(o) = self.output_rx.try_recv() {
                out.push(o);
            }
            out
        }

        fn statuses(&mut self) -> Vec<ConnectionStatus> {
            self.outputs()
                .into_iter()
                .filter_map(|o| match o {
                    RouterOutput::StatusChanged(s) => Some(s),
                    _ => None,
                })
                .collect()
        }

        fn decisions(&mut self) -> Vec<RoutingDecision> {
            self.outputs()
                .into_iter()
                .filter_map(|o| match o {
                    RouterOutput::Decision { decision, .. } => Some(decision),
                    _ => None,
                })
                .collect()
        }

        /// Sleeps on the paused clock and feeds any ticks back to the router.
        async fn run_for(&mut self, duration: Duration) -> Vec<OutboundFrame> {
            tokio::time::sleep(duration).await;
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            let mut probes = Vec::new();
            while let Ok(tick) = self.tick_rx.try_recv() {
                probes.extend(self.router.on_heartbeat_tick(tick));
            }
            probes
        }
    }

    fn kitchen(name: &str) -> KitchenName {
        KitchenName::new(name).unwrap()
    }

    fn connect() -> TransportSignal {
        TransportSignal::Connect { id: "sock-1".into() }
    }

    fn order(event_name: &str, payload: Value) -> TransportSignal {
        TransportSignal::Order {
            event_name: event_name.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let h = Harness::new();
        assert_eq!(h.router.status(), &ConnectionStatus::initial());
        assert!(h.router.kitchen().is_none());
        assert!(h.router.logs().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_moves_to_connecting() {
        let mut h = Harness::new();
        h.router.subscribe(kitchen("MainKitchen")).unwrap();
        assert_eq!(h.statuses(), vec![ConnectionStatus::Connecting]);
        assert_eq!(h.router.kitchen(), Some(&kitchen("MainKitchen")));
    }

    #[tokio::test]
    async fn test_subscribe_conflict_without_teardown() {
        let mut h = Harness::subscribed("North");
        assert_eq!(h.router.subscribe(kitchen("North")), Ok(()));
        assert_eq!(
            h.router.subscribe(kitchen("South")),
            Err(RouterError::SubscriptionConflict {
                current: kitchen("North"),
                requested: kitchen("South"),
            })
        );

        h.router.teardown();
        assert!(h.router.subscribe(kitchen("South")).is_ok());
    }

    #[tokio::test]
    async fn test_status_changed_once_per_transition() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(connect());
        h.router.handle(connect());
        h.router.handle(TransportSignal::Disconnect {
            reason: "transport close".into(),
        });
        h.router.handle(TransportSignal::ReconnectAttempt(1));
        h.router.handle(TransportSignal::ConnectError("timeout".into()));
        h.router.handle(connect());
        h.router.handle(TransportSignal::Reconnect(1));

        assert_eq!(
            h.statuses(),
            vec![
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected("transport close".into()),
                ConnectionStatus::Reconnecting(1),
                ConnectionStatus::Error("timeout".into()),
                ConnectionStatus::Connected,
            ]
        );
        assert_eq!(h.router.status(), &ConnectionStatus::Connected);

        let messages: Vec<&str> = h.router.logs().iter().map(|l| l.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Subscribing to kitchen MainKitchen",
                "Connected (id=sock-1)",
                "Connected (id=sock-1)",
                "Disconnected: transport close",
                "Reconnection attempt #1",
                "Connection error: timeout",
                "Connected (id=sock-1)",
                "Reconnected successfully",
            ]
        );
    }

    #[tokio::test]
    async fn test_order_decisions() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(order(
            "MainKitchen",
            json!({ "order_id": "1", "internal_order_status": "driver picked the order", "delivery_date": "2024-11-30" }),
        ));
        h.router.handle(order(
            "MainKitchen",
            json!({ "order_id": "2", "internal_order_status": "pending", "delivery_date": "2024-11-30" }),
        ));
        let future = json!({ "order_id": "3", "internal_order_status": "pending", "delivery_date": "2024-12-05" });
        h.router.handle(order("MainKitchen", future.clone()));

        assert_eq!(
            h.decisions(),
            vec![
                RoutingDecision::Refetch,
                RoutingDecision::Alert,
                RoutingDecision::Apply(OrderEvent::from_payload(future)),
            ]
        );
    }

    #[tokio::test]
    async fn test_decision_carries_kitchen_and_order_id() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(order(
            "MainKitchen",
            json!({ "order_id": "77", "internal_order_status": "order delivered" }),
        ));

        let decision = h.outputs().into_iter().find_map(|o| match o {
            RouterOutput::Decision { kitchen, order_id, .. } => Some((kitchen, order_id)),
            _ => None,
        });
        assert_eq!(decision, Some((kitchen("MainKitchen"), Some("77".to_string()))));
    }

    #[tokio::test]
    async fn test_malformed_order_still_applied() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(order("MainKitchen", json!({ "internal_order_status": "some_new_status" })));

        let decisions = h.decisions();
        assert_eq!(decisions.len(), 1);
        assert!(matches!(decisions[0], RoutingDecision::Apply(_)));
        assert!(h
            .router
            .logs()
            .iter()
            .any(|l| l.message.starts_with("Malformed order event: Payload missing field(s): order_id, delivery_date")));
    }

    #[tokio::test]
    async fn test_events_for_other_kitchens_ignored() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(order("OtherKitchen", json!({ "internal_order_status": "pending" })));
        assert!(h.decisions().is_empty());
    }

    #[tokio::test]
    async fn test_signals_ignored_after_teardown() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(connect());
        h.router.teardown();
        assert_eq!(
            h.router.status(),
            &ConnectionStatus::Disconnected(CLIENT_DISCONNECT_REASON.into())
        );
        h.outputs();

        h.router.handle(connect());
        h.router.handle(order("MainKitchen", json!({ "internal_order_status": "pending" })));
        assert!(h.outputs().is_empty());
        assert!(!h.router.heartbeat_running());
    }

    #[tokio::test]
    async fn test_pong_only_logs() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(connect());
        h.outputs();

        h.router.handle(TransportSignal::Pong);
        assert_eq!(h.router.status(), &ConnectionStatus::Connected);
        let outputs = h.outputs();
        assert_eq!(outputs.len(), 1);
        assert!(matches!(&outputs[0], RouterOutput::Log(entry) if entry.message == "Pong received"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_only_while_connected() {
        let mut h = Harness::subscribed("MainKitchen");
        assert!(h.run_for(PERIOD * 2).await.is_empty());

        h.router.handle(connect());
        assert!(h.router.heartbeat_running());
        assert_eq!(h.run_for(PERIOD).await, vec![OutboundFrame::Probe]);
        assert_eq!(h.run_for(PERIOD).await, vec![OutboundFrame::Probe]);

        h.router.handle(TransportSignal::Disconnect {
            reason: "ping timeout".into(),
        });
        assert!(!h.router.heartbeat_running());
        assert!(h.run_for(PERIOD * 3).await.is_empty());

        h.router.handle(TransportSignal::ReconnectAttempt(1));
        assert!(h.run_for(PERIOD).await.is_empty());

        h.router.handle(connect());
        assert_eq!(h.run_for(PERIOD).await, vec![OutboundFrame::Probe]);

        let pings = h.router.logs().iter().filter(|l| l.message == "Ping sent").count();
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_queued_before_disconnect_is_dropped() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router.handle(connect());

        tokio::time::sleep(PERIOD).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let tick = h.tick_rx.try_recv().unwrap();

        h.router.handle(TransportSignal::Disconnect {
            reason: "transport error".into(),
        });
        assert_eq!(h.router.on_heartbeat_tick(tick), None);

        h.router.handle(connect());
        assert_eq!(h.router.on_heartbeat_tick(tick), None);
    }

    #[tokio::test]
    async fn test_log_timestamps_non_decreasing() {
        let mut h = Harness::subscribed("MainKitchen");
        for i in 0..50 {
            match i % 4 {
                0 => h.router.handle(connect()),
                1 => h.router.handle(order("MainKitchen", json!({ "order_id": i }))),
                2 => h.router.handle(TransportSignal::Pong),
                _ => h.router.handle(TransportSignal::Disconnect {
                    reason: "transport close".into(),
                }),
            }
        }

        let logs: Vec<&LogEntry> = h.router.logs().iter().collect();
        assert!(logs.len() > 50);
        assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_log_trail_keeps_most_recent_entries() {
        let mut h = Harness::subscribed("MainKitchen");
        h.router = h.router.with_log_capacity(4);
        assert_eq!(h.router.logs().len(), 1);

        for _ in 0..10 {
            h.router.handle(TransportSignal::Pong);
        }
        h.router.handle(connect());

        let messages: Vec<&str> = h.router.logs().iter().map(|l| l.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Pong received", "Pong received", "Pong received", "Connected (id=sock-1)"]
        );

        // Evicted entries were still streamed to the host.
        let streamed = h
            .outputs()
            .into_iter()
            .filter(|o| matches!(o, RouterOutput::Log(_)))
            .count();
        assert_eq!(streamed, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_interval_still_probes() {
        let (output_tx, _output_rx) = mpsc::unbounded_channel();
        let (tick_tx, mut tick_rx) = mpsc::channel(16);
        let mut router = OrderEventRouter::new(Duration::ZERO, output_tx, tick_tx);
        router.subscribe(kitchen("MainKitchen")).unwrap();
        router.handle(connect());

        tokio::time::sleep(MIN_HEARTBEAT_INTERVAL).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let tick = tick_rx.try_recv().unwrap();
        assert_eq!(router.on_heartbeat_tick(tick), Some(OutboundFrame::Probe));
    }
}
