use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::reviewer::{DEFAULT_JUDGE, DEFAULT_REVIEW_TIMEOUT_SECS};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Judge program, invoked as `<judge> -p <prompt> <file>`
    pub(crate) judge: String,
    /// Seconds before the fetch command is killed
    pub(crate) fetch_timeout: u64,
    /// Seconds before the judge is killed
    pub(crate) review_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge: DEFAULT_JUDGE.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT_SECS,
            review_timeout: DEFAULT_REVIEW_TIMEOUT_SECS,
        }
    }
}

/// Command-line and environment values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub(crate) judge: Option<String>,
    pub(crate) fetch_timeout: Option<u64>,
    pub(crate) review_timeout: Option<u64>,
}

impl Config {
    pub(crate) fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".lgtmit"))
    }

    pub(crate) fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load `~/.lgtmit/config.toml`, falling back to defaults when absent.
    pub(crate) fn load() -> Result<Self> {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            // No home directory means no config file, not a broken one
            Err(_) => Ok(Self::default()),
        }
    }

    pub(crate) fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub(crate) fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(judge) = overrides.judge {
            self.judge = judge;
        }
        if let Some(secs) = overrides.fetch_timeout {
            self.fetch_timeout = secs;
        }
        if let Some(secs) = overrides.review_timeout {
            self.review_timeout = secs;
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.judge.trim().is_empty() {
            anyhow::bail!("judge program cannot be empty");
        }
        if self.fetch_timeout == 0 {
            anyhow::bail!("fetch_timeout must be at least 1 second");
        }
        if self.review_timeout == 0 {
            anyhow::bail!("review_timeout must be at least 1 second");
        }
        Ok(())
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub(crate) fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.review_timeout)
    }
}
