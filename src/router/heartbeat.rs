//! Liveness probe scheduling.
//!
//! One timer task per connection. The task only produces ticks; whether a
//! tick becomes a probe on the wire is decided by the router, which drops
//! ticks from a stopped timer (stale generation) or while disconnected.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Default probe period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest accepted probe period; `interval_at` rejects zero.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// A timer firing, tagged with the generation of the timer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick {
    pub generation: u64,
}

/// Owns the heartbeat timer task. The task is aborted on `stop` and on drop.
pub struct HeartbeatMonitor {
    period: Duration,
    tick_tx: mpsc::Sender<HeartbeatTick>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor. Periods below [`MIN_HEARTBEAT_INTERVAL`]
    /// are raised to it.
    pub fn new(period: Duration, tick_tx: mpsc::Sender<HeartbeatTick>) -> Self {
        if period < MIN_HEARTBEAT_INTERVAL {
            warn!("Heartbeat period {:?} too short, using {:?}", period, MIN_HEARTBEAT_INTERVAL);
        }
        Self {
            period: period.max(MIN_HEARTBEAT_INTERVAL),
            tick_tx,
            task: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Generation of the currently running (or last started) timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `tick` came from the timer that is running now.
    pub fn is_current(&self, tick: HeartbeatTick) -> bool {
        self.is_running() && tick.generation == self.generation
    }

    /// Starts the timer. Returns false if one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.task.is_some() {
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        let period = self.period;
        let tick_tx = self.tick_tx.clone();
        // First probe one full period after the connection comes up.
        let first = Instant::now() + period;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tick_tx.send(HeartbeatTick { generation }).await.is_err() {
                    break;
                }
            }
        }));

        debug!("Heartbeat timer #{} started ({:?})", generation, period);
        true
    }

    /// Stops the timer. Returns false if none was running.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                debug!("Heartbeat timer #{} stopped", self.generation);
                true
            }
            None => false,
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .field("generation", &self.generation)
            .finish()
    }
}
