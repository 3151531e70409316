//! Configuration loaded from semsift.toml
//!
//! Covers the cache TTL, dedup thresholds, and model file locations.
//! A default file is written on first use so every knob is visible.

use crate::dedup::{DedupPolicy, UniquenessRule};
use crate::embeddings::EngineRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a loaded model stays cached without access (sliding)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Optional ceiling on model load time, in seconds
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            load_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_same_distance")]
    pub same_distance: f32,
    #[serde(default = "default_similar_distance")]
    pub similar_distance: f32,
    #[serde(default = "default_max_similar")]
    pub max_similar: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_uniqueness")]
    pub uniqueness: UniquenessRule,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            same_distance: default_same_distance(),
            similar_distance: default_similar_distance(),
            max_similar: default_max_similar(),
            batch_size: default_batch_size(),
            uniqueness: default_uniqueness(),
        }
    }
}

impl DedupConfig {
    /// Thresholds as a classifier policy
    pub fn policy(&self) -> DedupPolicy {
        DedupPolicy {
            same_distance: self.same_distance,
            similar_distance: self.similar_distance,
            max_similar: self.max_similar,
            uniqueness: self.uniqueness,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Where fetched model files live; tilde-expanded
    #[serde(default = "default_models_dir")]
    pub dir: String,
    /// Optional engine registry TOML; the built-in catalog otherwise
    #[serde(default)]
    pub registry: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            registry: None,
        }
    }
}

impl ModelsConfig {
    pub fn models_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).into_owned())
    }
}

fn default_ttl_secs() -> u64 {
    crate::embeddings::DEFAULT_TTL_SECS
}

fn default_same_distance() -> f32 {
    0.2
}

fn default_similar_distance() -> f32 {
    0.5
}

fn default_max_similar() -> usize {
    10
}

fn default_batch_size() -> usize {
    32
}

fn default_uniqueness() -> UniquenessRule {
    UniquenessRule::CosineSimilarity { threshold: 0.5 }
}

fn default_models_dir() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("semsift").join("models").display().to_string())
        .unwrap_or_else(|| "~/.cache/semsift/models".to_string())
}

const DEFAULT_CONFIG_PATH: &str = "semsift.toml";

impl Config {
    /// Load configuration, writing a default file if none exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            return Self::create_default(path);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {}", path.display()))
    }

    /// The engine registry this configuration selects
    pub fn registry(&self) -> crate::error::Result<EngineRegistry> {
        match &self.models.registry {
            Some(path) => {
                let expanded = shellexpand::tilde(path).into_owned();
                EngineRegistry::load(expanded)
            }
            None => Ok(EngineRegistry::builtin()),
        }
    }

    fn create_default(path: &Path) -> Result<Self> {
        let config = Self::default();
        let content = format!(
            r#"# semsift configuration

[cache]
# Seconds a loaded model stays cached without access (sliding window)
ttl_secs = {ttl}

[dedup]
same_distance = {same}
similar_distance = {similar}
max_similar = {max_similar}
batch_size = {batch}
# Uniqueness gate: rule = "cosine" (similarity above threshold is a
# duplicate) or rule = "l2" (distance within threshold is a duplicate)
uniqueness = {{ rule = "cosine", threshold = 0.5 }}

[models]
dir = "{dir}"
"#,
            ttl = config.cache.ttl_secs,
            same = config.dedup.same_distance,
            similar = config.dedup.similar_distance,
            max_similar = config.dedup.max_similar,
            batch = config.dedup.batch_size,
            dir = config.models.dir.replace('\\', "/"),
        );

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write default config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_source_thresholds() {
        let config = Config::default();
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.dedup.same_distance, 0.2);
        assert_eq!(config.dedup.similar_distance, 0.5);
        assert_eq!(config.dedup.max_similar, 10);
        assert_eq!(config.dedup.batch_size, 32);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("semsift.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.dedup.max_similar, 10);

        // A second load parses the file we just wrote
        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.cache.ttl_secs, config.cache.ttl_secs);
    }

    #[test]
    fn test_uniqueness_rule_parses_both_modes() {
        let cosine: Config = toml::from_str(
            r#"
[dedup]
uniqueness = { rule = "cosine", threshold = 0.7 }
"#,
        )
        .unwrap();
        assert_eq!(
            cosine.dedup.uniqueness,
            UniquenessRule::CosineSimilarity { threshold: 0.7 }
        );

        let l2: Config = toml::from_str(
            r#"
[dedup]
uniqueness = { rule = "l2", threshold = 0.3 }
"#,
        )
        .unwrap();
        assert_eq!(
            l2.dedup.uniqueness,
            UniquenessRule::L2Distance { threshold: 0.3 }
        );
    }
}
