//! Web server module.
//!
//! This module provides the HTTP surface of the service:
//! - `POST /webhook` receives and verifies Stripe webhooks
//! - `GET /events`, `DELETE /events` list and clear the event log
//! - `GET /status`, `PUT /settings/webhook-secret` for the operator
//! - `GET /health`

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    clear_events, health, list_events, status, stripe_webhook, update_webhook_secret, AppState,
    ErrorResponse, HealthResponse, StatusResponse, WebhookResponse, NOT_CONFIGURED_MESSAGE,
};
pub use signature::{
    compute_signature, is_secret_configured, parse_header, sign_header, SignatureHeader,
    Verifier, VerifyError, DEFAULT_TOLERANCE, SIGNATURE_HEADER,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(stripe_webhook))
        .route("/events", get(list_events).delete(clear_events))
        .route("/status", get(status))
        .route("/settings/webhook-secret", put(update_webhook_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
