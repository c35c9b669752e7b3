//! Event types shared by the transport, the router and the host.
//!
//! Raw transport payloads are normalized into these types BEFORE any
//! routing logic looks at them.

mod order_events;
mod signals;

pub use order_events::{parse_delivery_date, LogEntry, MalformedEvent, OrderEvent, RoutingDecision};
pub use signals::{OutboundFrame, TransportSignal};
