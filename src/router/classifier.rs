//! Order event classification.

use chrono::NaiveDate;

use crate::events::{OrderEvent, RoutingDecision};

/// Statuses after which the kitchen's order list must be resynchronized.
pub const REFETCH_STATUSES: [&str; 3] = [
    "driver pickup pending",
    "driver picked the order",
    "order delivered",
];

/// Status of a newly placed order.
pub const PENDING_STATUS: &str = "pending";

/// Decides what the host must do with one order event.
///
/// First match wins:
/// 1. handoff/terminal status -> `Refetch`
/// 2. `pending` for delivery today -> `Alert`
/// 3. anything else, including unknown or missing status -> `Apply`
///
/// A same-day pending order is alerted but not applied.
pub fn classify(event: &OrderEvent, today: NaiveDate) -> RoutingDecision {
    let status = event.internal_order_status();

    if status.is_some_and(|s| REFETCH_STATUSES.contains(&s)) {
        return RoutingDecision::Refetch;
    }

    if status == Some(PENDING_STATUS) && event.delivery_date() == Some(today) {
        return RoutingDecision::Alert;
    }

    RoutingDecision::Apply(event.clone())
}
