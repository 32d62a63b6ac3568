use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable naming the mirror root directory.
pub const GIT_CACHE_DIR_ENV: &str = "GIT_CACHE_DIR";

/// Environment variable holding the durable-tier (KeyDB / Redis) endpoint.
pub const DURABLE_ENDPOINT_ENV: &str = "REDIS_HOST";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

// ---------------------------------------------------------------------------
// Mirror store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Directory holding one bare mirror per repository identity.
    #[serde(default = "default_mirror_root")]
    pub root: PathBuf,
    /// Upper bound (seconds) on a single clone or update subprocess.
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
    /// How long (seconds) `access_repo` waits for the repository lock.
    #[serde(default = "default_lock_wait_timeout")]
    pub lock_wait_timeout_secs: u64,
    /// Name or path of the git executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root: default_mirror_root(),
            clone_timeout_secs: default_clone_timeout(),
            lock_wait_timeout_secs: default_lock_wait_timeout(),
            git_binary: default_git_binary(),
        }
    }
}

impl MirrorConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_wait_timeout_secs)
    }
}

fn default_mirror_root() -> PathBuf {
    PathBuf::from("/tmp/gitcache")
}

fn default_clone_timeout() -> u64 {
    300
}

fn default_lock_wait_timeout() -> u64 {
    120
}

fn default_git_binary() -> String {
    "git".to_string()
}

// ---------------------------------------------------------------------------
// Response cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Capacity of the process-local tier, measured in payload bytes.
    #[serde(default = "default_volatile_max_bytes")]
    pub volatile_max_bytes: u64,
    /// Upper bound (seconds) an entry may live in the process-local tier.
    #[serde(default = "default_volatile_ttl")]
    pub volatile_ttl_secs: u64,
    #[serde(default)]
    pub durable: DurableConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volatile_max_bytes: default_volatile_max_bytes(),
            volatile_ttl_secs: default_volatile_ttl(),
            durable: DurableConfig::default(),
        }
    }
}

fn default_volatile_max_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_volatile_ttl() -> u64 {
    1200
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurableConfig {
    /// `host:port`, optionally prefixed with `redis://` or `rediss://`.
    /// Empty disables the durable tier.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub tls: bool,
    /// Name of the environment variable that holds the password.
    #[serde(default = "default_durable_auth_env")]
    pub auth_token_env: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            tls: false,
            auth_token_env: default_durable_auth_env(),
            pool_size: default_pool_size(),
        }
    }
}

impl DurableConfig {
    pub fn is_enabled(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}

fn default_durable_auth_env() -> String {
    "REDIS_PASSWORD".to_string()
}

fn default_pool_size() -> usize {
    4
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load a [`Config`] from an optional YAML file, then apply environment
/// overrides and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            parse_config(&contents)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        }
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(contents: &str) -> Result<Config> {
    // An empty document deserializes to `null`, which serde_yaml rejects for
    // a struct.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Overlay `GIT_CACHE_DIR` and `REDIS_HOST` on top of file values.
fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(GIT_CACHE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
        config.mirror.root = PathBuf::from(dir);
    }
    if let Some(endpoint) = lookup(DURABLE_ENDPOINT_ENV) {
        config.cache.durable.endpoint = endpoint.trim().to_string();
    }
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.mirror.clone_timeout_secs > 0,
        "mirror.clone_timeout_secs must be greater than zero"
    );
    anyhow::ensure!(
        config.mirror.lock_wait_timeout_secs > 0,
        "mirror.lock_wait_timeout_secs must be greater than zero"
    );
    anyhow::ensure!(
        config.cache.volatile_max_bytes > 0,
        "cache.volatile_max_bytes must be greater than zero"
    );
    anyhow::ensure!(
        config.cache.durable.pool_size > 0,
        "cache.durable.pool_size must be greater than zero"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = parse_config("").unwrap();
        assert_eq!(config.mirror.root, PathBuf::from("/tmp/gitcache"));
        assert_eq!(config.mirror.clone_timeout(), Duration::from_secs(300));
        assert_eq!(config.cache.volatile_max_bytes, 512 * 1024 * 1024);
        assert!(!config.cache.durable.is_enabled());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "mirror:\n  lock_wait_timeout_secs: 5\ncache:\n  durable:\n    endpoint: keydb.local:6380\n";
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.mirror.lock_wait_timeout_secs, 5);
        assert_eq!(config.mirror.git_binary, "git");
        assert!(config.cache.durable.is_enabled());
        assert_eq!(config.cache.durable.pool_size, 4);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = parse_config("mirror:\n  root: /srv/mirrors\n").unwrap();
        apply_env_overrides(&mut config, |name| match name {
            GIT_CACHE_DIR_ENV => Some("/var/cache/git".to_string()),
            DURABLE_ENDPOINT_ENV => Some(" redis://cache:6379 ".to_string()),
            _ => None,
        });
        assert_eq!(config.mirror.root, PathBuf::from("/var/cache/git"));
        assert_eq!(config.cache.durable.endpoint, "redis://cache:6379");
    }

    #[test]
    fn blank_cache_dir_env_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |name| {
            (name == GIT_CACHE_DIR_ENV).then(|| "  ".to_string())
        });
        assert_eq!(config.mirror.root, PathBuf::from("/tmp/gitcache"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = parse_config("mirror:\n  clone_timeout_secs: 0\n").unwrap();
        assert!(validate_config(&config).is_err());
    }
}
