//! Typed caches for every payload the request handlers cache, wired once
//! against a shared [`TieredCache`].

pub mod config_store;
pub mod payloads;

use anyhow::Result;
use tracing::{debug, warn};

use crate::cache::{FixedTtl, TieredCache, TypedCache};

pub use config_store::{ConfigStore, DefaultsConfigStore, ALLOWED_KEYS};
pub use payloads::{
    ConfigValue, ContributorNode, GraphQlData, RepositoriesOfViewer, RepositoryBranchCommit,
    RepositoryBranchInfo, RepositoryContributor, RepositoryFile, RepositoryNodeWithAttributes,
    RepositoryTreeCommit,
};

// ---------------------------------------------------------------------------
// Key prefixes
// ---------------------------------------------------------------------------

pub const CONFIG_PREFIX: &str = "config";
pub const REPOSITORIES_OF_VIEWER_PREFIX: &str = "githubrepositoriesofviewer";
pub const REPOSITORY_NODE_PREFIX: &str = "githubrepositorynodewithattributes";
pub const BRANCH_COMMIT_PREFIX: &str = "githubrepositorybranchcommit";
pub const CONTRIBUTOR_PREFIX: &str = "githubrepositorycontributor";
pub const FILE_PREFIX: &str = "githubfile";
pub const TREE_COMMIT_PREFIX: &str = "githubrepositorytreecommit";
pub const BRANCHES_PREFIX: &str = "githubrepositorybranches";

#[derive(Clone)]
pub struct CacheFacade {
    pub config_values: TypedCache<ConfigValue>,
    pub repositories_of_viewer: TypedCache<RepositoriesOfViewer>,
    pub repository_node: TypedCache<RepositoryNodeWithAttributes>,
    pub branch_commit: TypedCache<RepositoryBranchCommit>,
    pub contributors: TypedCache<RepositoryContributor>,
    pub files: TypedCache<RepositoryFile>,
    pub tree_commit: TypedCache<RepositoryTreeCommit>,
    pub branches: TypedCache<RepositoryBranchInfo>,
    backend: TieredCache,
}

impl CacheFacade {
    pub fn new(backend: TieredCache) -> Self {
        Self {
            config_values: TypedCache::new(backend.clone(), CONFIG_PREFIX, FixedTtl::minutes(5)),
            repositories_of_viewer: TypedCache::new(
                backend.clone(),
                REPOSITORIES_OF_VIEWER_PREFIX,
                FixedTtl::minutes(10),
            ),
            repository_node: TypedCache::new(backend.clone(), REPOSITORY_NODE_PREFIX, FixedTtl::minutes(10)),
            branch_commit: TypedCache::new(backend.clone(), BRANCH_COMMIT_PREFIX, FixedTtl::minutes(10)),
            contributors: TypedCache::new(backend.clone(), CONTRIBUTOR_PREFIX, FixedTtl::minutes(20)),
            files: TypedCache::new(backend.clone(), FILE_PREFIX, FixedTtl::minutes(20)),
            tree_commit: TypedCache::new(backend.clone(), TREE_COMMIT_PREFIX, FixedTtl::minutes(20)),
            branches: TypedCache::new(backend.clone(), BRANCHES_PREFIX, FixedTtl::minutes(20)),
            backend,
        }
    }

    pub fn backend(&self) -> &TieredCache {
        &self.backend
    }

    /// Read a configuration value, falling back to `store` on a cache miss
    /// and caching what it returns.
    pub async fn get_config_value(&self, store: &dyn ConfigStore, key: &str) -> Result<String> {
        match self.config_values.get(key).await {
            Ok(Some(cached)) => return Ok(cached.value),
            Ok(None) => {}
            Err(e) => warn!(%key, error = %e, "config cache read failed"),
        }

        let value = store.get(key).await?;
        debug!(%key, "config value loaded from store");
        if let Err(e) = self.config_values.set(key, &ConfigValue { value: value.clone() }).await {
            warn!(%key, error = %e, "config cache write failed");
        }
        Ok(value)
    }

    /// Persist a configuration value, then refresh its cache entry.
    pub async fn set_config_value(&self, store: &dyn ConfigStore, key: &str, value: &str) -> Result<()> {
        store.set(key, value).await?;
        let cached = ConfigValue {
            value: value.to_string(),
        };
        if let Err(e) = self.config_values.set(key, &cached).await {
            warn!(%key, error = %e, "config cache write failed");
        }
        Ok(())
    }
}
