use crate::ExplorerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_EXPAND_ALL_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Upper bound for a single catalog fetch. `0` disables the limit.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Catalog document used when no `--catalog` argument is given.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// How many levels "expand all" walks before stopping.
    #[serde(default = "default_expand_all_depth")]
    pub expand_all_depth: usize,
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_expand_all_depth() -> usize {
    DEFAULT_EXPAND_ALL_DEPTH
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            catalog_path: None,
            expand_all_depth: DEFAULT_EXPAND_ALL_DEPTH,
        }
    }
}

impl ExplorerConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the platform config directory (`<config>/dashview/config.json`).
    pub fn new() -> Result<Self, ExplorerError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ExplorerError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        Ok(Self {
            path: config_dir.join("dashview").join("config.json"),
        })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<ExplorerConfig, ExplorerError> {
        if !self.path.exists() {
            log::debug!("No config at {}, using defaults", self.path.display());
            return Ok(ExplorerConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let config: ExplorerConfig = serde_json::from_str(&content).map_err(|e| {
            ExplorerError::InvalidConfig(format!("{}: {}", self.path.display(), e))
        })?;

        Ok(config)
    }

    pub fn save(&self, config: &ExplorerConfig) -> Result<(), ExplorerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| ExplorerError::InvalidConfig(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
