//! HTTP handlers.
//!
//! The webhook handler:
//! 1. Verifies the `Stripe-Signature` header against the configured secret
//! 2. Records the event in the log (append + classify in one step)
//! 3. Notifies registered listeners
//!
//! Operator handlers list and clear the log and update the signing secret.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::event::{Event, EventHooks, EventLog, KeyValueStore, LoggedEvent, StoreError};
use crate::settings::Settings;
use crate::web::signature::{constant_time_compare, Verifier, VerifyError, SIGNATURE_HEADER};
use crate::Config;

/// Error text returned when no signing secret is configured.
pub const NOT_CONFIGURED_MESSAGE: &str =
    "Webhook secret not configured. Set it in Settings before forwarding events.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub log: Arc<EventLog>,
    pub settings: Settings,
    pub hooks: Arc<EventHooks>,
}

impl AppState {
    /// Build the state, loading the event log from `store`.
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let log = EventLog::with_capacity(store.clone(), config.event_log_capacity)?;
        let settings = Settings::new(store, config.webhook_secret.clone());

        Ok(Self {
            config: Arc::new(config),
            log: Arc::new(log),
            settings,
            hooks: Arc::new(EventHooks::new()),
        })
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Webhook response.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Error body shared by every endpoint.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Operator acknowledgement.
#[derive(Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
}

/// Configuration overview for the operator.
#[derive(Serialize)]
pub struct StatusResponse {
    pub webhook_secret_configured: bool,
    pub event_count: usize,
    pub capacity: usize,
}

/// Body of `PUT /settings/webhook-secret`.
#[derive(Debug, Deserialize)]
pub struct SecretUpdate {
    pub webhook_secret: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn storage_error(err: &StoreError) -> Response {
    error!(error = %err, "event_store_unavailable");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record event")
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Stripe Webhook
// =============================================================================

/// Stripe webhook endpoint.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    info!(
        body_length = body.len(),
        has_signature = !signature.is_empty(),
        "webhook_received"
    );

    let secret = match state.settings.webhook_secret() {
        Ok(secret) => secret,
        Err(e) => return storage_error(&e),
    };

    let verifier = Verifier::new(secret, state.config.webhook_tolerance);
    let wire = match verifier.verify(&body, signature) {
        Ok(wire) => wire,
        Err(VerifyError::NotConfigured) => {
            warn!("webhook_secret_not_configured");
            return error_response(StatusCode::BAD_REQUEST, NOT_CONFIGURED_MESSAGE);
        }
        Err(e @ VerifyError::MalformedPayload(_)) => {
            warn!(error = %e, "webhook_payload_invalid");
            return error_response(StatusCode::BAD_REQUEST, "Invalid payload");
        }
        Err(e) => {
            warn!(error = %e, "webhook_signature_invalid");
            return error_response(StatusCode::BAD_REQUEST, "Invalid signature");
        }
    };

    let entry = match state.log.record(Event::received(wire)).await {
        Ok(entry) => entry,
        Err(e) => return storage_error(&e),
    };

    info!(
        seq = entry.seq,
        event_id = %entry.event.id,
        event_type = %entry.event.event_type,
        status = entry.event.status.as_str(),
        "event_recorded"
    );

    state.hooks.dispatch(&entry);

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "received",
            event_type: entry.event.event_type,
        }),
    )
        .into_response()
}

// =============================================================================
// Operator Endpoints
// =============================================================================

/// Check the bearer token on operator requests.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let expected = state.config.admin_token.as_deref();

    match (provided, expected) {
        (Some(provided), Some(expected)) if constant_time_compare(provided, expected) => Ok(()),
        (None, Some(_)) => {
            warn!("operator_auth_missing");
            Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        (Some(_), Some(_)) => {
            warn!("operator_auth_invalid");
            Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        (_, None) => {
            // No token configured, allow through
            warn!("operator_auth_not_configured");
            Ok(())
        }
    }
}

/// List logged events, newest first.
pub async fn list_events(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let events: Vec<LoggedEvent> = state.log.list().await;
    (StatusCode::OK, Json(events)).into_response()
}

/// Clear the event log.
pub async fn clear_events(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    if let Err(e) = state.log.clear().await {
        error!(error = %e, "event_log_clear_failed");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear events");
    }

    (StatusCode::OK, Json(ActionResponse { status: "cleared" })).into_response()
}

/// Configuration overview.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let webhook_secret_configured = match state.settings.webhook_secret_configured() {
        Ok(configured) => configured,
        Err(e) => {
            error!(error = %e, "settings_read_failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read settings");
        }
    };

    (
        StatusCode::OK,
        Json(StatusResponse {
            webhook_secret_configured,
            event_count: state.log.len().await,
            capacity: state.log.capacity(),
        }),
    )
        .into_response()
}

/// Replace the webhook signing secret.
pub async fn update_webhook_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<SecretUpdate>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    if let Err(e) = state.settings.set_webhook_secret(&update.webhook_secret) {
        error!(error = %e, "settings_write_failed");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save settings");
    }

    (StatusCode::OK, Json(ActionResponse { status: "saved" })).into_response()
}
