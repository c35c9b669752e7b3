//! Kitchen Order Notifications - real-time order routing for kitchen screens.
//!
//! Connects to an order-notification server, one subscription per kitchen,
//! and turns what the server pushes into decisions a kitchen display acts on.
//!
//! # Architecture
//!
//! - **Normalized signals**: the transport delivers a closed set of
//!   `TransportSignal`s; nothing downstream parses frames
//! - **Kitchen isolation**: each kitchen has its own executor, router and
//!   transport task
//! - **Pure routing core**: status transitions and order classification are
//!   plain functions, testable without a runtime
//! - **Scoped timers**: the heartbeat is owned by the router and cancelled on
//!   disconnect, teardown and drop
//!
//! # Routing
//!
//! Each order event yields exactly one [`RoutingDecision`]:
//! - handoff/terminal status (`driver pickup pending`, `driver picked the order`,
//!   `order delivered`) -> `Refetch`
//! - `pending` for delivery today -> `Alert`
//! - anything else -> `Apply(event)`
//!
//! # Usage
//!
//! ```no_run
//! use kitchen_notify::connectors::WebSocketTransport;
//! use kitchen_notify::kitchens::{KitchenExecutor, KitchenName};
//! use kitchen_notify::router::RouterOutput;
//! use kitchen_notify::NotifierConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NotifierConfig::from_env();
//!     let (output_tx, mut output_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//!     let transport = WebSocketTransport::new(config.server_url.clone(), config.transport.clone());
//!     let (executor, _handle) = KitchenExecutor::new(
//!         KitchenName::default(),
//!         config.heartbeat_interval,
//!         transport,
//!         output_tx,
//!     );
//!     tokio::spawn(executor.run());
//!
//!     while let Some(output) = output_rx.recv().await {
//!         if let RouterOutput::Decision { decision, .. } = output {
//!             println!("{}", decision.kind());
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod events;
pub mod kitchens;
pub mod orders;
pub mod router;
pub mod utils;

// Re-export commonly used types
pub use config::{NotifierConfig, TransportConfig};
pub use events::{LogEntry, OrderEvent, RoutingDecision, TransportSignal};
pub use kitchens::{KitchenExecutor, KitchenHandle, KitchenName};
pub use orders::OrderBoard;
pub use router::{classify, ConnectionStatus, OrderEventRouter, RouterOutput};
