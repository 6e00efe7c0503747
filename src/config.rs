use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cluster::ResolveStrategy;
use crate::error::{DedupError, Result};
use crate::hasher::{HashSettings, MAX_HASH_SIZE};
use crate::policy::SurvivorPolicy;
use crate::scanner::ScanOptions;

const CONFIG_DIR: &str = "photoreject";
const CONFIG_FILE: &str = "config.json";

/// Everything that tunes a deduplication run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Maximum Hamming distance at which two hashes count as duplicates.
    pub threshold: u32,
    pub hash: HashSettings,
    pub strategy: ResolveStrategy,
    pub keep: SurvivorPolicy,
    pub scan: ScanOptions,
    /// Hash images on the rayon pool instead of one after another.
    pub parallel: bool,
    /// Record applied rejections in `<folder>/.history.jsonl`.
    pub history: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            hash: HashSettings::default(),
            strategy: ResolveStrategy::default(),
            keep: SurvivorPolicy::default(),
            scan: ScanOptions::default(),
            parallel: false,
            history: true,
        }
    }
}

impl DedupConfig {
    /// Read a config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: DedupConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, otherwise the per-user config file when it
    /// exists, otherwise the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/photoreject/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash.size == 0 || self.hash.size > MAX_HASH_SIZE {
            return Err(DedupError::InvalidConfig {
                message: format!(
                    "hash size must be between 1 and {}, got {}",
                    MAX_HASH_SIZE, self.hash.size
                ),
            });
        }
        if self.scan.extensions.is_empty() {
            return Err(DedupError::InvalidConfig {
                message: "at least one image extension is required".to_string(),
            });
        }
        Ok(())
    }
}
