//! Response cache: a volatile moka tier, an optional KeyDB tier, and typed
//! prefixed views over both.

pub mod durable;
pub mod tiered;
pub mod ttl;
pub mod typed;

pub use durable::{DurableTier, KeyDbTier};
pub use tiered::{CacheError, TieredCache};
pub use ttl::{FixedTtl, TtlPolicy};
pub use typed::TypedCache;
