//! Engine configuration, loaded from a TOML file.
//!
//! Mirrors the load/validate shape used for agent configuration in the
//! broader product this engine was extracted from: read the file, parse it,
//! then reject values that can never be sensible. Defaulting of "0 means
//! unbounded/default" values is left to the store constructors, since that's
//! a per-store concern, not a config-file concern.

use std::path::Path;

use serde::Deserialize;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub cache_root: std::path::PathBuf,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub max_cache_size: u64,
    #[serde(default = "default_meta_ttl")]
    pub meta_ttl: i64,
    #[serde(default = "default_dir_ttl")]
    pub dir_ttl: i64,
    #[serde(default)]
    pub debug: bool,
}

fn default_meta_ttl() -> i64 {
    60
}

fn default_dir_ttl() -> i64 {
    5
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| CacheError::Input(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(CacheError::Input("cache_root must not be empty".into()));
        }
        if self.meta_ttl < 0 {
            return Err(CacheError::Input("meta_ttl must not be negative".into()));
        }
        if self.dir_ttl < 0 {
            return Err(CacheError::Input("dir_ttl must not be negative".into()));
        }
        Ok(())
    }
}
