//! Store configuration
//!
//! Safety limits and write settings, read from `GITCORE_*` environment
//! variables with defaults for anything unset.

use anyhow::Context;

pub const MAX_DELTA_DEPTH_VAR: &str = "GITCORE_MAX_DELTA_DEPTH";
pub const MAX_SYMREF_HOPS_VAR: &str = "GITCORE_MAX_SYMREF_HOPS";
pub const COMPRESSION_LEVEL_VAR: &str = "GITCORE_COMPRESSION_LEVEL";
pub const DELTA_CACHE_BYTES_VAR: &str = "GITCORE_DELTA_CACHE_BYTES";

pub const DEFAULT_MAX_DELTA_DEPTH: usize = 10_000;
pub const DEFAULT_MAX_SYMREF_HOPS: usize = 5;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_DELTA_CACHE_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Longest delta chain the pack decoder will follow
    pub max_delta_depth: usize,
    /// Longest symbolic ref chain the resolver will follow
    pub max_symref_hops: usize,
    /// zlib level used for loose objects and written packs
    pub compression_level: u32,
    /// Budget for resolved delta bases kept per pack
    pub delta_cache_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_delta_depth: DEFAULT_MAX_DELTA_DEPTH,
            max_symref_hops: DEFAULT_MAX_SYMREF_HOPS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            delta_cache_bytes: DEFAULT_DELTA_CACHE_BYTES,
        }
    }
}

impl StoreConfig {
    /// Load the configuration from the environment
    ///
    /// Unset variables keep their defaults; a set but unparsable variable is an error.
    pub fn load_from_env() -> anyhow::Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = StoreConfig::default();

        if let Some(value) = lookup(MAX_DELTA_DEPTH_VAR) {
            config.max_delta_depth = value
                .trim()
                .parse()
                .with_context(|| format!("{MAX_DELTA_DEPTH_VAR} must be a number, got {value:?}"))?;
        }

        if let Some(value) = lookup(MAX_SYMREF_HOPS_VAR) {
            config.max_symref_hops = value
                .trim()
                .parse()
                .with_context(|| format!("{MAX_SYMREF_HOPS_VAR} must be a number, got {value:?}"))?;
        }

        if let Some(value) = lookup(COMPRESSION_LEVEL_VAR) {
            let level: u32 = value.trim().parse().with_context(|| {
                format!("{COMPRESSION_LEVEL_VAR} must be a number, got {value:?}")
            })?;
            if level > 9 {
                anyhow::bail!("{COMPRESSION_LEVEL_VAR} must be between 0 and 9, got {level}");
            }
            config.compression_level = level;
        }

        if let Some(value) = lookup(DELTA_CACHE_BYTES_VAR) {
            config.delta_cache_bytes = value
                .trim()
                .parse()
                .with_context(|| format!("{DELTA_CACHE_BYTES_VAR} must be a number, got {value:?}"))?;
        }

        Ok(config)
    }
}
