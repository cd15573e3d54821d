//! Stripe webhook receiver with a bounded event log.
//!
//! This library provides the shared modules for the two binaries:
//! - `stripe-webhook-server`: receives webhooks forwarded by `stripe listen`
//! - `stripe-webhook-sign`: signs a payload for manual testing
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → Verifier → EventLog::record → EventHooks
//!                                  ↑
//!                  GET /events, DELETE /events (operator)
//! ```

pub mod config;
pub mod event;
pub mod settings;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use event::{
    Event, EventHooks, EventLog, EventStatus, JsonFileStore, KeyValueStore, LoggedEvent,
    MemoryStore, StoreError,
};
pub use settings::Settings;
pub use web::{router, AppState, Verifier, VerifyError};
