//! Per-kitchen executor that wires a transport to an order event router.
//!
//! Each kitchen runs in its own task with its own router and transport:
//! - One live subscription at a time
//! - Signals processed strictly in arrival order
//! - Heartbeat ticks turned into probes only while connected
//!
//! Switching kitchens tears the old subscription down completely (transport
//! aborted, heartbeat cancelled, in-flight signals discarded) before the new
//! one starts.

use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connectors::TransportFactory;
use crate::events::{OutboundFrame, TransportSignal};
use crate::kitchens::KitchenName;
use crate::router::{ConnectionStatus, HeartbeatTick, OrderEventRouter, RouterError, RouterOutput};

const SIGNAL_BUFFER: usize = 256;
const OUTBOUND_BUFFER: usize = 16;
const CONTROL_BUFFER: usize = 8;
const TICK_BUFFER: usize = 4;

/// Requests the host can make of a running executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorControl {
    SwitchKitchen(KitchenName),
    Shutdown,
}

/// Cloneable handle for controlling a running [`KitchenExecutor`].
#[derive(Debug, Clone)]
pub struct KitchenHandle {
    control_tx: mpsc::Sender<ExecutorControl>,
}

impl KitchenHandle {
    /// Asks the executor to move its subscription to `kitchen`.
    /// Returns false if the executor has stopped.
    pub async fn switch_kitchen(&self, kitchen: KitchenName) -> bool {
        self.control_tx
            .send(ExecutorControl::SwitchKitchen(kitchen))
            .await
            .is_ok()
    }

    /// Asks the executor to tear down and exit.
    pub async fn shutdown(&self) -> bool {
        self.control_tx.send(ExecutorControl::Shutdown).await.is_ok()
    }
}

/// Executor for a single kitchen subscription.
pub struct KitchenExecutor<F: TransportFactory> {
    kitchen: KitchenName,
    router: OrderEventRouter,
    factory: F,
    tick_rx: mpsc::Receiver<HeartbeatTick>,
    control_rx: mpsc::Receiver<ExecutorControl>,
    signal_rx: mpsc::Receiver<TransportSignal>,
    outbound_tx: Option<mpsc::Sender<OutboundFrame>>,
    transport_task: Option<JoinHandle<()>>,
}

impl<F: TransportFactory> KitchenExecutor<F> {
    /// Creates an executor and the handle that controls it.
    ///
    /// Router outputs for this kitchen are sent on `output_tx`.
    pub fn new(
        kitchen: KitchenName,
        heartbeat_interval: Duration,
        factory: F,
        output_tx: mpsc::UnboundedSender<RouterOutput>,
    ) -> (Self, KitchenHandle) {
        let (tick_tx, tick_rx) = mpsc::channel(TICK_BUFFER);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        // Replaced on every subscription.
        let (_, signal_rx) = mpsc::channel(1);

        let executor = Self {
            kitchen,
            router: OrderEventRouter::new(heartbeat_interval, output_tx, tick_tx),
            factory,
            tick_rx,
            control_rx,
            signal_rx,
            outbound_tx: None,
            transport_task: None,
        };

        (executor, KitchenHandle { control_tx })
    }

    /// Pins the date used for same-day alerts.
    pub fn with_fixed_date(mut self, today: NaiveDate) -> Self {
        self.router.pin_date(today);
        self
    }

    pub fn kitchen(&self) -> &KitchenName {
        &self.kitchen
    }

    pub fn status(&self) -> &ConnectionStatus {
        self.router.status()
    }

    /// Runs until shut down or until every handle is dropped.
    pub async fn run(mut self) {
        info!("[{}] KitchenExecutor starting", self.kitchen);

        if let Err(e) = self.start_subscription() {
            error!("[{}] {}", self.kitchen, e);
            return;
        }

        loop {
            tokio::select! {
                // Transport signals first, so a queued disconnect is seen
                // before a heartbeat tick or a control request.
                biased;

                Some(signal) = self.signal_rx.recv() => {
                    self.router.handle(signal);
                }

                Some(tick) = self.tick_rx.recv() => {
                    if let Some(frame) = self.router.on_heartbeat_tick(tick) {
                        self.forward(frame);
                    }
                }

                control = self.control_rx.recv() => {
                    match control {
                        Some(ExecutorControl::SwitchKitchen(kitchen)) => {
                            if let Err(e) = self.switch_kitchen(kitchen) {
                                error!("[{}] Kitchen switch failed: {}", self.kitchen, e);
                                break;
                            }
                        }
                        Some(ExecutorControl::Shutdown) => {
                            info!("[{}] Shutdown requested", self.kitchen);
                            break;
                        }
                        None => {
                            debug!("[{}] All handles dropped", self.kitchen);
                            break;
                        }
                    }
                }
            }
        }

        self.stop_subscription();
        info!("[{}] KitchenExecutor stopped", self.kitchen);
    }

    fn switch_kitchen(&mut self, kitchen: KitchenName) -> Result<(), RouterError> {
        if kitchen == self.kitchen {
            debug!("[{}] Already subscribed", self.kitchen);
            return Ok(());
        }

        info!("[{}] Switching to kitchen {}", self.kitchen, kitchen);
        self.stop_subscription();
        self.kitchen = kitchen;
        self.start_subscription()
    }

    fn start_subscription(&mut self) -> Result<(), RouterError> {
        self.router.subscribe(self.kitchen.clone())?;

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        self.signal_rx = signal_rx;
        self.outbound_tx = Some(outbound_tx);
        self.transport_task = Some(self.factory.spawn(&self.kitchen, signal_tx, outbound_rx));

        debug!("[{}] Transport started", self.kitchen);
        Ok(())
    }

    fn stop_subscription(&mut self) {
        if let Some(task) = self.transport_task.take() {
            task.abort();
            debug!("[{}] Transport stopped", self.kitchen);
        }
        self.outbound_tx = None;

        // Anything still queued belongs to the connection being torn down.
        self.signal_rx.close();
        while self.signal_rx.try_recv().is_ok() {}
        while self.tick_rx.try_recv().is_ok() {}

        self.router.teardown();
    }

    fn forward(&self, frame: OutboundFrame) {
        let Some(outbound_tx) = self.outbound_tx.as_ref() else {
            return;
        };
        if let Err(e) = outbound_tx.try_send(frame) {
            warn!("[{}] Failed to forward {:?}: {}", self.kitchen, frame, e);
        }
    }
}

impl<F: TransportFactory> Drop for KitchenExecutor<F> {
    fn drop(&mut self) {
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }
    }
}

impl<F: TransportFactory> std::fmt::Debug for KitchenExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KitchenExecutor")
            .field("kitchen", &self.kitchen)
            .field("router", &self.router)
            .field("transport_running", &self.transport_task.is_some())
            .finish()
    }
}
