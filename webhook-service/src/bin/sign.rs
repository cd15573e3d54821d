//! Stripe webhook signer.
//!
//! Prints a `Stripe-Signature` header value for a JSON payload, signed with
//! `STRIPE_WEBHOOK_SECRET`, so the server can be exercised with plain curl:
//!
//! ```text
//! stripe-webhook-sign event.json
//! curl -X POST localhost:8080/webhook \
//!      -H "Stripe-Signature: $(stripe-webhook-sign event.json)" \
//!      --data-binary @event.json
//! ```
//!
//! Reads the payload from stdin when no path (or `-`) is given.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stripe_webhooks::event::StripeEvent;
use stripe_webhooks::web::sign_header;
use stripe_webhooks::Config;

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    let secret = match config.webhook_secret {
        Some(secret) => secret,
        None => bail!("STRIPE_WEBHOOK_SECRET is not set"),
    };

    let path = std::env::args().nth(1);
    let payload = match path.as_deref() {
        None | Some("-") => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read payload from stdin")?;
            buf
        }
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read payload from {path}"))?
        }
    };

    // Refuse to sign something the server would reject as an invalid payload
    let event: StripeEvent =
        serde_json::from_slice(&payload).context("Payload is not a Stripe event")?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock before unix epoch")?
        .as_secs() as i64;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        timestamp = timestamp,
        "payload_signed"
    );

    println!("{}", sign_header(&secret, timestamp, &payload));

    Ok(())
}
