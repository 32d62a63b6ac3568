//! Networked, TTL-bearing cache tier backed by KeyDB / Redis.
//!
//! Values are stored as JSON strings so any process sharing the keyspace can
//! read them.  Expiry is enforced by the server (`SET ... PX`).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface};
use fred::types::config::{ReconnectPolicy, ServerConfig, TlsConnector};
use fred::types::{Builder, Expiration};
use tracing::info;

use crate::config::DurableConfig;

/// Cross-process cache tier.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyDB pool
// ---------------------------------------------------------------------------

pub struct KeyDbTier {
    pool: Pool,
}

impl KeyDbTier {
    /// Connect (and PING) a pool described by `config`.  The password, if
    /// any, is read from the environment variable named in
    /// `config.auth_token_env`.
    pub async fn connect(config: &DurableConfig) -> Result<Self> {
        let auth_token = std::env::var(&config.auth_token_env)
            .ok()
            .filter(|t| !t.is_empty());

        let endpoint = config
            .endpoint
            .trim()
            .trim_start_matches("rediss://")
            .trim_start_matches("redis://");
        let (host, port) = parse_host_port(endpoint)?;

        let mut fred_config = fred::types::config::Config {
            server: ServerConfig::new_centralized(host, port),
            password: auth_token,
            ..fred::types::config::Config::default()
        };
        if config.tls {
            fred_config.tls = Some(TlsConnector::default_rustls()?.into());
        }

        let mut builder = Builder::from_config(fred_config);
        builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));
        let pool = builder
            .build_pool(config.pool_size)
            .context("failed to build durable cache pool")?;
        pool.init().await.context("failed to connect to durable cache")?;
        let _: String = pool
            .ping(None)
            .await
            .context("durable cache PING failed after connect")?;

        info!(
            host,
            port,
            tls = config.tls,
            pool_size = config.pool_size,
            "durable cache pool connected"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl DurableTier for KeyDbTier {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .pool
            .get(key)
            .await
            .with_context(|| format!("GET {key} failed"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // PX 0 is rejected by the server.
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        let _: Option<String> = self
            .pool
            .set(key, value, Some(Expiration::PX(millis)), None, false)
            .await
            .with_context(|| format!("SET {key} failed"))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.quit().await.context("failed to quit durable cache pool")?;
        Ok(())
    }
}

/// Parse a `host:port` string.  If the port is omitted, defaults to `6379`.
pub fn parse_host_port(endpoint: &str) -> Result<(&str, u16)> {
    let endpoint = endpoint.split('/').next().unwrap_or(endpoint);

    if let Some((host, port_str)) = endpoint.rsplit_once(':') {
        let port: u16 = port_str
            .parse()
            .with_context(|| format!("invalid port in endpoint: {endpoint}"))?;
        Ok((host, port))
    } else {
        Ok((endpoint, 6379))
    }
}

// ---------------------------------------------------------------------------
// In-process stand-in
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    /// Expiring map with the same contract as the KeyDB tier.  Uses Tokio's
    /// clock so paused-time tests can step past a TTL.
    #[derive(Default)]
    pub(crate) struct MemoryTier {
        entries: Mutex<HashMap<String, (String, Instant)>>,
        failing: AtomicBool,
    }

    impl MemoryTier {
        pub(crate) fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DurableTier for MemoryTier {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some((_, expires)) if *expires <= Instant::now() => {
                    entries.remove(key);
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value.clone())),
                None => Ok(None),
            }
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.check()?;
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTier;
    use super::*;

    #[test]
    fn parse_host_port_with_port() {
        let (host, port) = parse_host_port("keydb.local:6380").unwrap();
        assert_eq!(host, "keydb.local");
        assert_eq!(port, 6380);
    }

    #[test]
    fn parse_host_port_defaults_port() {
        assert_eq!(parse_host_port("keydb.local").unwrap(), ("keydb.local", 6379));
        assert!(parse_host_port("keydb.local:http").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn memory_tier_expires_entries() {
        let tier = MemoryTier::default();
        tier.set("k", "\"v\"", Duration::from_secs(1)).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap().as_deref(), Some("\"v\""));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tier.get("k").await.unwrap(), None);
    }

    /// Runs against a live server when `FORGEMIRROR_TEST_REDIS` names one.
    #[tokio::test]
    async fn keydb_entry_expires_after_ttl() {
        let Ok(endpoint) = std::env::var("FORGEMIRROR_TEST_REDIS") else {
            return;
        };
        let config = DurableConfig {
            endpoint,
            ..DurableConfig::default()
        };
        let tier = KeyDbTier::connect(&config).await.unwrap();
        let key = format!("forgemirror-test:{}", std::process::id());

        tier.set(&key, "{\"n\":1}", Duration::from_secs(1)).await.unwrap();
        assert_eq!(tier.get(&key).await.unwrap().as_deref(), Some("{\"n\":1}"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tier.get(&key).await.unwrap(), None);
        tier.close().await.unwrap();
    }
}
