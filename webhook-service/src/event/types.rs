//! Event types for the webhook log.
//!
//! This module defines:
//! - `StripeEvent`: the wire form decoded from a verified webhook body
//! - `Event`: what the log keeps for each delivery
//! - `EventStatus`: the received → processed | unhandled state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event types that the service knows how to handle.
///
/// Anything outside this list is recorded as `unhandled`.
pub const HANDLED_EVENT_TYPES: [&str; 5] = [
    "checkout.session.completed",
    "payment_intent.succeeded",
    "payment_intent.created",
    "charge.succeeded",
    "customer.created",
];

// =============================================================================
// Wire Types
// =============================================================================

/// Stripe event envelope as sent in the webhook body.
///
/// Only `id` and `type` are required; the rest is carried for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    /// Provider-assigned event id (`evt_...`)
    pub id: String,
    /// Dot-separated event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// Wrapper holding the affected object
    #[serde(default)]
    pub data: Option<EventData>,
    /// Provider-side creation time (unix seconds)
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub livemode: Option<bool>,
}

/// The `data` member of a Stripe event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Option<Value>,
}

impl StripeEvent {
    /// The affected object, or an empty JSON object if the body had none.
    pub fn object(&self) -> Value {
        self.data
            .as_ref()
            .and_then(|d| d.object.clone())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

// =============================================================================
// Log Types
// =============================================================================

/// Processing status of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Initial state, set when the event is appended
    Received,
    /// The event type is one the service handles
    Processed,
    /// The event type is not handled
    Unhandled,
}

impl EventStatus {
    /// Map an event type to its terminal status.
    pub fn classify(event_type: &str) -> Self {
        if HANDLED_EVENT_TYPES.contains(&event_type) {
            EventStatus::Processed
        } else {
            EventStatus::Unhandled
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Received)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Received => "received",
            EventStatus::Processed => "processed",
            EventStatus::Unhandled => "unhandled",
        }
    }
}

/// An event as ingested from a verified webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// The provider's `data.object`
    pub payload: Value,
    /// Ingestion time (not provider time)
    pub received_at: DateTime<Utc>,
    pub status: EventStatus,
    /// Provider-side creation time (unix seconds), for display
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub livemode: Option<bool>,
}

impl Event {
    /// Build a freshly received event from its wire form.
    pub fn received(wire: StripeEvent) -> Self {
        let payload = wire.object();
        Self {
            id: wire.id,
            event_type: wire.event_type,
            payload,
            received_at: Utc::now(),
            status: EventStatus::Received,
            created: wire.created,
            livemode: wire.livemode,
        }
    }

    /// Id of the affected object (`data.object.id`), if any.
    pub fn object_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }
}

/// A log entry: the event plus the sequence number the log assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Handle returned by `EventLog::append`, naming exactly one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) u64);

impl EventHandle {
    pub fn seq(self) -> u64 {
        self.0
    }
}
