use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::tiered::{CacheError, TieredCache};
use super::ttl::TtlPolicy;

/// A view over [`TieredCache`] for one payload type under one key prefix.
///
/// Raw keys are namespaced as `prefix:raw`, so two typed caches with
/// different prefixes never see each other's entries.
pub struct TypedCache<T> {
    backend: TieredCache,
    prefix: &'static str,
    ttl: Arc<dyn TtlPolicy>,
    persist: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCache<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            prefix: self.prefix,
            ttl: Arc::clone(&self.ttl),
            persist: self.persist,
            _payload: PhantomData,
        }
    }
}

impl<T> TypedCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(backend: TieredCache, prefix: &'static str, ttl: impl TtlPolicy + 'static) -> Self {
        Self {
            backend,
            prefix,
            ttl: Arc::new(ttl),
            persist: true,
            _payload: PhantomData,
        }
    }

    /// Keep entries in the volatile tier only.
    pub fn local_only(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn full_key(&self, raw_key: &str) -> String {
        format!("{}:{raw_key}", self.prefix)
    }

    pub async fn get(&self, raw_key: &str) -> Result<Option<T>, CacheError> {
        self.backend.get(&self.full_key(raw_key)).await
    }

    pub async fn set(&self, raw_key: &str, value: &T) -> Result<(), CacheError> {
        let ttl = self.ttl.ttl_for(raw_key);
        self.backend
            .set(&self.full_key(raw_key), value, ttl, self.persist)
            .await
    }

    /// Return the cached value, or run `fetch` and cache its result.
    ///
    /// Cache failures are logged and treated as a miss; only `fetch` errors
    /// reach the caller.
    pub async fn get_or_fetch<F, Fut>(&self, raw_key: &str, fetch: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match self.get(raw_key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!(prefix = self.prefix, key = %raw_key, "cache miss"),
            Err(e) => warn!(prefix = self.prefix, key = %raw_key, error = %e, "cache read failed; fetching"),
        }

        let value = fetch().await?;
        if let Err(e) = self.set(raw_key, &value).await {
            warn!(prefix = self.prefix, key = %raw_key, error = %e, "cache write failed");
        }
        Ok(value)
    }
}
