//! Normalized order events and the decisions derived from them.
//!
//! Raw transport payloads are converted into an [`OrderEvent`] exactly once,
//! on receipt. Nothing downstream looks at the JSON again except through
//! [`OrderEvent::raw_payload`].

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

/// Fields an order payload is expected to carry.
const REQUIRED_FIELDS: [&str; 3] = ["order_id", "internal_order_status", "delivery_date"];

/// A payload that could not be fully normalized.
///
/// Never fatal: the event is still routed, this only feeds the log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload missing field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Unparseable delivery_date: {0}")]
    InvalidDeliveryDate(String),
}

/// An order notification as received from the transport. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    kitchen_name: Option<String>,
    order_id: Option<String>,
    internal_order_status: Option<String>,
    delivery_date: Option<NaiveDate>,
    raw_delivery_date: Option<String>,
    raw_payload: Value,
}

impl OrderEvent {
    /// Normalizes a raw payload. Missing or mistyped fields become `None`.
    pub fn from_payload(payload: Value) -> Self {
        let raw_delivery_date = string_field(&payload, "delivery_date");
        let delivery_date = raw_delivery_date.as_deref().and_then(parse_delivery_date);

        Self {
            kitchen_name: string_field(&payload, "kitchen_name"),
            order_id: string_field(&payload, "order_id"),
            internal_order_status: string_field(&payload, "internal_order_status"),
            delivery_date,
            raw_delivery_date,
            raw_payload: payload,
        }
    }

    pub fn kitchen_name(&self) -> Option<&str> {
        self.kitchen_name.as_deref()
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn internal_order_status(&self) -> Option<&str> {
        self.internal_order_status.as_deref()
    }

    /// Delivery date, if the payload carried a parseable one.
    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    /// The payload exactly as received.
    pub fn raw_payload(&self) -> &Value {
        &self.raw_payload
    }

    /// Reports what is wrong with the payload, if anything.
    pub fn validate(&self) -> Result<(), MalformedEvent> {
        if !self.raw_payload.is_object() {
            return Err(MalformedEvent::NotAnObject);
        }

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| match *field {
                "order_id" => self.order_id.is_none(),
                "internal_order_status" => self.internal_order_status.is_none(),
                _ => self.raw_delivery_date.is_none(),
            })
            .collect();

        if !missing.is_empty() {
            return Err(MalformedEvent::MissingFields(missing));
        }

        if self.delivery_date.is_none() {
            let raw = self.raw_delivery_date.clone().unwrap_or_default();
            return Err(MalformedEvent::InvalidDeliveryDate(raw));
        }

        Ok(())
    }
}

/// Parses `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to the date as
/// written (its own offset, not UTC).
pub fn parse_delivery_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Reads a field as a string, accepting JSON numbers as well.
fn string_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What the host must do in response to one order event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Raise an interruptive new-order notification.
    Alert,
    /// The order list is stale; resynchronize it from the source of truth.
    Refetch,
    /// Merge the event into current order state.
    Apply(OrderEvent),
}

impl RoutingDecision {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingDecision::Alert => "alert",
            RoutingDecision::Refetch => "refetch",
            RoutingDecision::Apply(_) => "apply",
        }
    }
}

/// A single line of the router's log trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload_reads_fields() {
        let event = OrderEvent::from_payload(json!({
            "kitchen_name": "MainKitchen",
            "order_id": "A-17",
            "internal_order_status": "pending",
            "delivery_date": "2024-11-30",
        }));

        assert_eq!(event.kitchen_name(), Some("MainKitchen"));
        assert_eq!(event.order_id(), Some("A-17"));
        assert_eq!(event.internal_order_status(), Some("pending"));
        assert_eq!(event.delivery_date(), NaiveDate::from_ymd_opt(2024, 11, 30));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_numeric_order_id_is_stringified() {
        let event = OrderEvent::from_payload(json!({ "order_id": 4021 }));
        assert_eq!(event.order_id(), Some("4021"));
    }

    #[test]
    fn test_missing_fields_reported() {
        let event = OrderEvent::from_payload(json!({ "internal_order_status": "some_new_status" }));
        assert_eq!(
            event.validate(),
            Err(MalformedEvent::MissingFields(vec!["order_id", "delivery_date"]))
        );
    }

    #[test]
    fn test_non_object_payload() {
        let event = OrderEvent::from_payload(json!("hello"));
        assert_eq!(event.validate(), Err(MalformedEvent::NotAnObject));
        assert_eq!(event.internal_order_status(), None);
    }

    #[test]
    fn test_invalid_delivery_date() {
        let event = OrderEvent::from_payload(json!({
            "order_id": "1",
            "internal_order_status": "pending",
            "delivery_date": "tomorrow",
        }));
        assert_eq!(event.delivery_date(), None);
        assert_eq!(
            event.validate(),
            Err(MalformedEvent::InvalidDeliveryDate("tomorrow".to_string()))
        );
    }

    #[test]
    fn test_parse_delivery_date_rfc3339() {
        assert_eq!(
            parse_delivery_date("2024-11-30T09:15:00Z"),
            NaiveDate::from_ymd_opt(2024, 11, 30)
        );
        assert_eq!(parse_delivery_date("30/11/2024"), None);
    }

    #[test]
    fn test_parse_delivery_date_keeps_written_date() {
        // 20:00 at -05:00 is already the next day in UTC.
        assert_eq!(
            parse_delivery_date("2024-11-30T20:00:00-05:00"),
            NaiveDate::from_ymd_opt(2024, 11, 30)
        );
        assert_eq!(
            parse_delivery_date("2024-11-30T01:30:00+09:00"),
            NaiveDate::from_ymd_opt(2024, 11, 30)
        );
    }

    #[test]
    fn test_decision_kind() {
        assert_eq!(RoutingDecision::Alert.kind(), "alert");
        assert_eq!(RoutingDecision::Refetch.kind(), "refetch");
        let event = OrderEvent::from_payload(json!({}));
        assert_eq!(RoutingDecision::Apply(event).kind(), "apply");
    }
}
