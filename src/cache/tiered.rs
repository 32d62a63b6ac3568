//! Two-tier response cache: a process-local moka tier in front of an
//! optional KeyDB tier.
//!
//! The volatile tier is authoritative for this process.  The durable tier
//! only warms other processes and restarts, so the two are not written
//! transactionally.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::durable::{DurableTier, KeyDbTier};
use crate::config::CacheConfig;
use crate::metrics::{MetricsRegistry, Tier};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode cached value for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("durable tier error: {0:#}")]
    Durable(anyhow::Error),
}

#[derive(Clone)]
pub struct TieredCache {
    volatile: Cache<String, Arc<str>>,
    durable: Option<Arc<dyn DurableTier>>,
    metrics: MetricsRegistry,
}

impl TieredCache {
    /// Build a cache whose volatile tier holds at most `max_bytes` of keys
    /// and encoded values, each for at most `volatile_ttl`.
    pub fn new(
        max_bytes: u64,
        volatile_ttl: Duration,
        durable: Option<Arc<dyn DurableTier>>,
        metrics: MetricsRegistry,
    ) -> Self {
        let volatile = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|key: &String, value: &Arc<str>| {
                u32::try_from(key.len() + value.len()).unwrap_or(u32::MAX)
            })
            .time_to_live(volatile_ttl)
            .build();
        Self {
            volatile,
            durable,
            metrics,
        }
    }

    /// Build from configuration, connecting the durable tier when an endpoint
    /// is configured.
    pub async fn from_config(config: &CacheConfig, metrics: MetricsRegistry) -> Result<Self> {
        let durable: Option<Arc<dyn DurableTier>> = if config.durable.is_enabled() {
            Some(Arc::new(KeyDbTier::connect(&config.durable).await?))
        } else {
            debug!("no durable cache endpoint configured; running volatile-only");
            None
        };
        Ok(Self::new(
            config.volatile_max_bytes,
            Duration::from_secs(config.volatile_ttl_secs),
            durable,
            metrics,
        ))
    }

    pub fn has_durable_tier(&self) -> bool {
        self.durable.is_some()
    }

    /// Look `key` up in the volatile tier, then the durable tier.  A durable
    /// hit is copied into the volatile tier.  `Ok(None)` is a plain miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let metrics = &self.metrics.metrics;

        if let Some(raw) = self.volatile.get(key).await {
            trace!(%key, "volatile cache hit");
            metrics.record_hit(Tier::Volatile);
            return decode(key, &raw).map(Some);
        }

        let Some(durable) = &self.durable else {
            metrics.cache_misses.inc();
            return Ok(None);
        };
        let raw = match durable.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics.cache_misses.inc();
                return Ok(None);
            }
            Err(e) => {
                metrics.record_error(Tier::Durable);
                return Err(CacheError::Durable(e));
            }
        };

        trace!(%key, "durable cache hit");
        metrics.record_hit(Tier::Durable);
        let value = decode(key, &raw)?;
        self.volatile.insert(key.to_string(), Arc::from(raw)).await;
        Ok(Some(value))
    }

    /// Store `value` in the volatile tier and, when `persist` is set and a
    /// durable tier exists, in the durable tier with `ttl`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        persist: bool,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;

        self.volatile.insert(key.to_string(), Arc::from(raw.as_str())).await;
        if let Some(durable) = self.durable.as_ref().filter(|_| persist) {
            if let Err(e) = durable.set(key, &raw, ttl).await {
                self.metrics.metrics.record_error(Tier::Durable);
                return Err(CacheError::Durable(e));
            }
        }
        trace!(%key, persist, ?ttl, "cache entry stored");
        Ok(())
    }

    /// Drop `key` from the volatile tier only.
    pub async fn invalidate_local(&self, key: &str) {
        self.volatile.invalidate(key).await;
    }

    /// Quit the durable tier's connections.
    pub async fn close(&self) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.close().await {
                warn!(error = %format!("{e:#}"), "failed to close durable cache");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, CacheError> {
    serde_json::from_str(raw).map_err(|source| CacheError::Decode {
        key: key.to_string(),
        source,
    })
}
