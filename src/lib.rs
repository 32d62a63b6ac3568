//! Local git mirror cache and tiered response cache for a forge front-end.
//!
//! [`mirror::RepoCacheManager`] keeps bare, shallow, tree-filtered mirrors of
//! remote repositories on disk and serializes access to each one.
//! [`facade::CacheFacade`] exposes typed, prefixed views over a
//! [`cache::TieredCache`] (moka in front of KeyDB).

pub mod cache;
pub mod config;
pub mod facade;
pub mod git;
pub mod metrics;
pub mod mirror;
pub mod paginate;
