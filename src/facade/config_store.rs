use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

/// Keys accepted by the configuration store, with their defaults.
pub const ALLOWED_KEYS: &[(&str, &str)] = &[
    ("password_expiry_days", "90"),
    ("password_never_expires", "false"),
    ("max_login_attempts", "5"),
    ("session_timeout", "30"),
];

/// Authoritative source of configuration values, read through the cache.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<String>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

fn default_for(key: &str) -> Option<&'static str> {
    ALLOWED_KEYS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// In-process store: starts from [`ALLOWED_KEYS`] and keeps overrides in
/// memory.  Unknown keys are rejected.
#[derive(Default)]
pub struct DefaultsConfigStore {
    overrides: RwLock<HashMap<String, String>>,
}

impl DefaultsConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for DefaultsConfigStore {
    async fn get(&self, key: &str) -> Result<String> {
        let Some(default) = default_for(key) else {
            bail!("invalid configuration key: {key}");
        };
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        Ok(overrides.get(key).cloned().unwrap_or_else(|| default.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if default_for(key).is_none() {
            bail!("invalid configuration key: {key}");
        }
        info!(%key, %value, "configuration value set");
        self.overrides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
