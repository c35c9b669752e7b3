//! Kitchen Order Notifier - Main Entry Point
//!
//! Spawns one executor per configured kitchen. Each executor owns its own
//! subscription, router and transport, so a failing connection for one
//! kitchen does not affect any other kitchen.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kitchen_notify::config::LogFormat;
use kitchen_notify::connectors::WebSocketTransport;
use kitchen_notify::utils::init_telemetry;
use kitchen_notify::{
    KitchenExecutor, KitchenName, NotifierConfig, OrderBoard, RouterOutput, RoutingDecision,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let dotenv = dotenvy::dotenv();

    init_telemetry(LogFormat::from_env());

    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let config = NotifierConfig::from_env();

    info!("╔════════════════════════════════════════════════════════╗");
    info!("║   Kitchen Order Notifier                               ║");
    info!("╚════════════════════════════════════════════════════════╝");
    info!("Server: {}", config.server_url);
    info!("Heartbeat interval: {:?}", config.heartbeat_interval);
    match config.transport.reconnection_attempts {
        Some(n) => info!("Reconnection attempts: {}", n),
        None => info!("Reconnection attempts: unbounded"),
    }

    let transport = WebSocketTransport::new(config.server_url.clone(), config.transport.clone());

    let mut handles = Vec::new();
    let mut tasks: Vec<(KitchenName, JoinHandle<()>, JoinHandle<()>)> = Vec::new();

    for kitchen in &config.kitchens {
        info!("[{}] Spawning executor", kitchen);

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (executor, handle) = KitchenExecutor::new(
            kitchen.clone(),
            config.heartbeat_interval,
            transport.clone(),
            output_tx,
        );

        let executor_task = tokio::spawn(executor.run());
        let board_task = tokio::spawn(mirror_outputs(kitchen.clone(), output_rx));

        handles.push(handle);
        tasks.push((kitchen.clone(), executor_task, board_task));
    }

    info!("All kitchen executors started. Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");

    for handle in &handles {
        handle.shutdown().await;
    }

    for (kitchen, executor_task, board_task) in tasks {
        if let Err(e) = executor_task.await {
            error!("[{}] Executor task panicked: {:?}", kitchen, e);
        }
        // Ends once the executor (and its router) is dropped.
        if let Err(e) = board_task.await {
            error!("[{}] Order board task panicked: {:?}", kitchen, e);
        }
    }

    info!("All executors stopped. Shutting down.");
    Ok(())
}

/// Applies router outputs for one kitchen to its order board.
async fn mirror_outputs(
    kitchen: KitchenName,
    mut output_rx: mpsc::UnboundedReceiver<RouterOutput>,
) {
    let mut board = OrderBoard::new();

    while let Some(output) = output_rx.recv().await {
        match output {
            RouterOutput::StatusChanged(status) => {
                info!("[{}] Socket status: {}", kitchen, status);
            }
            RouterOutput::Decision { order_id, decision, .. } => {
                let order_id = order_id.unwrap_or_else(|| "<unknown>".to_string());
                match &decision {
                    RoutingDecision::Alert => {
                        warn!("[{}] NEW ORDER for today: {}", kitchen, order_id);
                    }
                    RoutingDecision::Refetch => {
                        info!(
                            "[{}] Order {} handed off, order list needs a refetch",
                            kitchen, order_id
                        );
                    }
                    RoutingDecision::Apply(_) => {
                        debug!("[{}] Order {} updated", kitchen, order_id);
                    }
                }

                board.apply(decision);
                if board.alert_open() {
                    // No operator surface here; the log line above is the alert.
                    board.acknowledge_alert();
                }
                if board.refetch_pending() {
                    // No order source to reload from: drop the stale mirror and
                    // rebuild it from subsequent events.
                    board.complete_refetch(Vec::new());
                }
                debug!("[{}] Board: {} order(s)", kitchen, board.len());
            }
            RouterOutput::Log(entry) => {
                debug!(
                    "[{}] {} {}",
                    kitchen,
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.message
                );
            }
        }
    }
}
