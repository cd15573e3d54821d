//! Configuration module for environment variable parsing.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::event::MAX_EVENTS;
use crate::web::signature::DEFAULT_TOLERANCE;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Stripe webhook signing secret (`whsec_...`), as printed by `stripe listen`
    pub webhook_secret: Option<String>,

    /// Maximum age of a signed timestamp; `None` disables the check
    pub webhook_tolerance: Option<Duration>,

    /// Number of events kept in the log
    pub event_log_capacity: usize,

    /// Directory for persisted state; in-memory only when unset
    pub data_dir: Option<PathBuf>,

    /// Bearer token required on operator endpoints
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            webhook_secret: None,
            webhook_tolerance: Some(DEFAULT_TOLERANCE),
            event_log_capacity: MAX_EVENTS,
            data_dir: None,
            admin_token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_var("PORT", defaults.port),

            webhook_secret: non_empty_var("STRIPE_WEBHOOK_SECRET"),

            webhook_tolerance: match parse_var("WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE.as_secs())
            {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },

            event_log_capacity: match parse_var("EVENT_LOG_CAPACITY", defaults.event_log_capacity) {
                0 => {
                    warn!(env_var = "EVENT_LOG_CAPACITY", "Capacity must be positive, using default");
                    defaults.event_log_capacity
                }
                n => n,
            },

            data_dir: non_empty_var("DATA_DIR").map(PathBuf::from),

            admin_token: non_empty_var("ADMIN_TOKEN"),
        }
    }
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
