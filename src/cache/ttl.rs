use std::time::Duration;

/// Decides how long a typed cache entry lives in the durable tier.
pub trait TtlPolicy: Send + Sync {
    fn ttl_for(&self, raw_key: &str) -> Duration;
}

/// Same TTL for every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTtl(pub Duration);

impl FixedTtl {
    pub const fn minutes(m: u64) -> Self {
        Self(Duration::from_secs(m * 60))
    }
}

impl TtlPolicy for FixedTtl {
    fn ttl_for(&self, _raw_key: &str) -> Duration {
        self.0
    }
}

impl<F> TtlPolicy for F
where
    F: Fn(&str) -> Duration + Send + Sync,
{
    fn ttl_for(&self, raw_key: &str) -> Duration {
        self(raw_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_can_vary_ttl_by_key() {
        let policy = |key: &str| {
            if key.ends_with(":HEAD") {
                Duration::from_secs(60)
            } else {
                Duration::from_secs(3600)
            }
        };
        assert_eq!(policy.ttl_for("github:a:b:HEAD"), Duration::from_secs(60));
        assert_eq!(policy.ttl_for("github:a:b:v1.0"), Duration::from_secs(3600));
        assert_eq!(FixedTtl::minutes(5).ttl_for("anything"), Duration::from_secs(300));
    }
}
