//! Host-side mirror of a kitchen's orders.
//!
//! Applies routing decisions the way a kitchen screen would: merge updates,
//! raise the new-order alert, or flag the list as stale until it has been
//! reloaded from the source of truth.

use crate::events::{OrderEvent, RoutingDecision};

#[derive(Debug, Default, Clone)]
pub struct OrderBoard {
    orders: Vec<OrderEvent>,
    alert_open: bool,
    refetch_pending: bool,
}

impl OrderBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one decision.
    pub fn apply(&mut self, decision: RoutingDecision) {
        match decision {
            RoutingDecision::Alert => self.alert_open = true,
            RoutingDecision::Refetch => self.refetch_pending = true,
            RoutingDecision::Apply(event) => self.upsert(event),
        }
    }

    /// Replaces the order with the same id, or appends. Events without an
    /// id are always appended.
    fn upsert(&mut self, event: OrderEvent) {
        let existing = event.order_id().and_then(|id| {
            self.orders
                .iter()
                .position(|o| o.order_id() == Some(id))
        });

        match existing {
            Some(index) => self.orders[index] = event,
            None => self.orders.push(event),
        }
    }

    /// Dismisses the new-order alert.
    pub fn acknowledge_alert(&mut self) {
        self.alert_open = false;
    }

    /// Installs a freshly fetched order list and clears the stale flag.
    pub fn complete_refetch(&mut self, orders: Vec<OrderEvent>) {
        self.orders = orders;
        self.refetch_pending = false;
    }

    pub fn orders(&self) -> &[OrderEvent] {
        &self.orders
    }

    pub fn get(&self, order_id: &str) -> Option<&OrderEvent> {
        self.orders.iter().find(|o| o.order_id() == Some(order_id))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn alert_open(&self) -> bool {
        self.alert_open
    }

    pub fn refetch_pending(&self) -> bool {
        self.refetch_pending
    }
}
