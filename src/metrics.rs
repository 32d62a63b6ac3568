use std::sync::Arc;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TierLabels {
    pub tier: Tier,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Tier {
    Volatile,
    Durable,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MirrorLabels {
    pub outcome: MirrorOutcomeLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum MirrorOutcomeLabel {
    Cloned,
    Updated,
    Stale,
    Failed,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every metric exposed by the mirror manager and the response cache.
pub struct Metrics {
    // -- response cache --
    pub cache_hits: Family<TierLabels, Counter>,
    pub cache_misses: Counter,
    pub cache_errors: Family<TierLabels, Counter>,

    // -- mirrors --
    pub mirror_runs: Family<MirrorLabels, Counter>,
    pub mirrors_cloning: Gauge,

    // -- locks --
    pub lock_waits: Counter,
    pub lock_timeouts: Counter,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let cache_hits = Family::<TierLabels, Counter>::default();
        registry.register(
            "forgemirror_cache_hits",
            "Response cache hits by tier",
            cache_hits.clone(),
        );

        let cache_misses = Counter::default();
        registry.register(
            "forgemirror_cache_misses",
            "Response cache lookups that found nothing in any tier",
            cache_misses.clone(),
        );

        let cache_errors = Family::<TierLabels, Counter>::default();
        registry.register(
            "forgemirror_cache_errors",
            "Response cache backend failures by tier",
            cache_errors.clone(),
        );

        let mirror_runs = Family::<MirrorLabels, Counter>::default();
        registry.register(
            "forgemirror_mirror_runs",
            "Clone/update runs by outcome",
            mirror_runs.clone(),
        );

        let mirrors_cloning: Gauge = Gauge::default();
        registry.register(
            "forgemirror_mirrors_cloning",
            "Repositories with a clone or update in flight",
            mirrors_cloning.clone(),
        );

        let lock_waits = Counter::default();
        registry.register(
            "forgemirror_lock_waits",
            "Repository lock acquisitions that had to wait for another holder",
            lock_waits.clone(),
        );

        let lock_timeouts = Counter::default();
        registry.register(
            "forgemirror_lock_timeouts",
            "Repository lock waits that gave up",
            lock_timeouts.clone(),
        );

        Self {
            cache_hits,
            cache_misses,
            cache_errors,
            mirror_runs,
            mirrors_cloning,
            lock_waits,
            lock_timeouts,
        }
    }

    pub(crate) fn record_hit(&self, tier: Tier) {
        self.cache_hits.get_or_create(&TierLabels { tier }).inc();
    }

    pub(crate) fn record_error(&self, tier: Tier) {
        self.cache_errors.get_or_create(&TierLabels { tier }).inc();
    }

    pub(crate) fn record_mirror_run(&self, outcome: MirrorOutcomeLabel) {
        self.mirror_runs.get_or_create(&MirrorLabels { outcome }).inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, shared by the cache and the
/// mirror manager.
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in the OpenMetrics text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        // Writing into a String cannot fail.
        let _ = encode(&mut buf, &self.registry);
        buf
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_recorded_series() {
        let registry = MetricsRegistry::new();
        registry.metrics.record_hit(Tier::Durable);
        registry.metrics.record_mirror_run(MirrorOutcomeLabel::Stale);
        registry.metrics.cache_misses.inc();

        let text = registry.encode();
        assert!(text.contains("forgemirror_cache_hits_total{tier=\"Durable\"} 1"));
        assert!(text.contains("forgemirror_mirror_runs_total{outcome=\"Stale\"} 1"));
        assert!(text.contains("forgemirror_cache_misses_total 1"));
    }
}
