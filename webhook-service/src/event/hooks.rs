//! Listener registration for recorded events.
//!
//! Integrations (membership plugins, fulfilment, mirroring into another log)
//! subscribe here instead of being wired into the webhook handler.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::types::{EventStatus, LoggedEvent};

type Listener = Arc<dyn Fn(&LoggedEvent) + Send + Sync>;

/// Registry of callbacks invoked after an event has been recorded.
#[derive(Default)]
pub struct EventHooks {
    listeners: RwLock<Vec<Listener>>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&LoggedEvent) + Send + Sync + 'static,
    {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(Arc::new(listener)),
            Err(_) => warn!("event_hooks_lock_poisoned"),
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener with the recorded entry.
    pub fn dispatch(&self, entry: &LoggedEvent) {
        // Snapshot so listeners may register further listeners
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => {
                warn!("event_hooks_lock_poisoned");
                return;
            }
        };

        for listener in listeners {
            listener(entry);
        }
    }
}

/// Built-in listener writing one diagnostic line per recorded event.
pub fn log_outcome(entry: &LoggedEvent) {
    let event = &entry.event;
    let object_id = event.object_id().unwrap_or("unknown");

    if event.status == EventStatus::Unhandled {
        info!(event_id = %event.id, event_type = %event.event_type, "event_type_unhandled");
        return;
    }

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            info!(event_id = %event.id, session_id = %object_id, "checkout_completed")
        }
        "payment_intent.succeeded" => {
            info!(event_id = %event.id, payment_intent_id = %object_id, "payment_succeeded")
        }
        "payment_intent.created" => {
            info!(event_id = %event.id, payment_intent_id = %object_id, "payment_intent_created")
        }
        "charge.succeeded" => info!(event_id = %event.id, charge_id = %object_id, "charge_succeeded"),
        "customer.created" => {
            info!(event_id = %event.id, customer_id = %object_id, "customer_created")
        }
        other => info!(event_id = %event.id, event_type = %other, "event_processed"),
    }
}
