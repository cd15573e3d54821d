//! Operator-managed settings.
//!
//! The webhook secret is read from the key-value store on every request so
//! that an update from the operator takes effect without a restart. The
//! secret from the environment is used when nothing has been stored.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::event::{KeyValueStore, StoreError, WEBHOOK_SECRET_KEY};
use crate::web::signature::is_secret_configured;

#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KeyValueStore>,
    fallback_secret: Option<String>,
}

impl Settings {
    pub fn new(store: Arc<dyn KeyValueStore>, fallback_secret: Option<String>) -> Self {
        Self {
            store,
            fallback_secret,
        }
    }

    /// Current webhook signing secret, if any.
    pub fn webhook_secret(&self) -> Result<Option<String>, StoreError> {
        let stored = self
            .store
            .get(WEBHOOK_SECRET_KEY)?
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| is_secret_configured(s));

        Ok(stored.or_else(|| {
            self.fallback_secret
                .as_ref()
                .filter(|s| is_secret_configured(s))
                .cloned()
        }))
    }

    pub fn webhook_secret_configured(&self) -> Result<bool, StoreError> {
        Ok(self.webhook_secret()?.is_some())
    }

    /// Store a new webhook secret. Surrounding whitespace is stripped; an
    /// empty value removes the stored secret.
    pub fn set_webhook_secret(&self, value: &str) -> Result<(), StoreError> {
        let value = value.trim();
        if !is_secret_configured(value) {
            self.store.delete(WEBHOOK_SECRET_KEY)?;
            info!("webhook_secret_removed");
        } else {
            self.store
                .put(WEBHOOK_SECRET_KEY, Value::String(value.to_string()))?;
            info!(secret_length = value.len(), "webhook_secret_saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemoryStore;

    #[test]
    fn test_no_secret() {
        let settings = Settings::new(Arc::new(MemoryStore::new()), None);
        assert_eq!(settings.webhook_secret().unwrap(), None);
        assert!(!settings.webhook_secret_configured().unwrap());
    }

    #[test]
    fn test_fallback_secret() {
        let settings = Settings::new(Arc::new(MemoryStore::new()), Some("whsec_env".to_string()));
        assert_eq!(
            settings.webhook_secret().unwrap(),
            Some("whsec_env".to_string())
        );
    }

    #[test]
    fn test_blank_fallback_is_not_configured() {
        let settings = Settings::new(Arc::new(MemoryStore::new()), Some("  ".to_string()));
        assert!(!settings.webhook_secret_configured().unwrap());
    }

    #[test]
    fn test_stored_secret_overrides_fallback() {
        let settings = Settings::new(Arc::new(MemoryStore::new()), Some("whsec_env".to_string()));
        settings.set_webhook_secret("  whsec_stored \n").unwrap();
        assert_eq!(
            settings.webhook_secret().unwrap(),
            Some("whsec_stored".to_string())
        );

        settings.set_webhook_secret("").unwrap();
        assert_eq!(
            settings.webhook_secret().unwrap(),
            Some("whsec_env".to_string())
        );
    }

    #[test]
    fn test_store_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let settings = Settings::new(store.clone(), None);
        store.set_unavailable(true);
        assert!(settings.webhook_secret().is_err());
        assert!(settings.set_webhook_secret("whsec_1").is_err());
    }
}
