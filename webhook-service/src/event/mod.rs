//! Event log module.
//!
//! This module provides:
//! - Event types and the status state machine
//! - The bounded, newest-first `EventLog`
//! - Key-value persistence backends
//! - Listener registration for recorded events
//!
//! ## Flow
//!
//! ```text
//! verified StripeEvent → Event::received() → EventLog::record() → EventHooks::dispatch()
//! ```

pub mod hooks;
pub mod log;
pub mod store;
pub mod types;

pub use hooks::{log_outcome, EventHooks};
pub use log::{EventLog, MAX_EVENTS};
pub use store::{
    JsonFileStore, KeyValueStore, MemoryStore, StoreError, EVENTS_KEY, WEBHOOK_SECRET_KEY,
};
pub use types::{
    Event, EventData, EventHandle, EventStatus, LoggedEvent, StripeEvent, HANDLED_EVENT_TYPES,
};
