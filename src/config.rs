//! Configuration loading and persistence.
//!
//! Reads and writes the scormrelay configuration file and applies
//! environment overrides on top. Everything has a default, so a missing
//! file is not an error.

// Rust guideline compliant 2026-04

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cmi::ReadAllowlist;
use crate::constants::{
    DEFAULT_AUTOCOMMIT_DELAY, DEFAULT_COMPLETION_PATH, DEFAULT_DATA_MODEL_TIMEOUT,
    HTTP_REQUEST_TIMEOUT,
};

const CONFIG_FILE: &str = "config.json";

/// Configuration for the scormrelay tool.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RelayConfig {
    /// Path the completion endpoint lives under on the LMS host.
    pub completion_path: String,
    /// Whether writes arm the debounced auto-commit.
    pub autocommit: bool,
    /// Debounce window in seconds between a write and its auto-commit.
    pub autocommit_seconds: u64,
    /// Bounded wait in seconds for the data-model delivery.
    pub data_model_timeout_seconds: u64,
    /// Timeout in seconds for completion HTTP requests.
    pub http_timeout_seconds: u64,
    /// Replacement read allowlist patterns (wildcarded elements).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_allowlist: Option<Vec<String>>,
    /// Fixed course-module context id for completion submissions. When
    /// unset the id is scanned out of the content page path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_context_id: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            completion_path: DEFAULT_COMPLETION_PATH.to_owned(),
            autocommit: true,
            autocommit_seconds: DEFAULT_AUTOCOMMIT_DELAY.as_secs(),
            data_model_timeout_seconds: DEFAULT_DATA_MODEL_TIMEOUT.as_secs(),
            http_timeout_seconds: HTTP_REQUEST_TIMEOUT.as_secs(),
            read_allowlist: None,
            completion_context_id: None,
        }
    }
}

impl RelayConfig {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/scormrelay-test`
    /// 2. `SCORMRELAY_CONFIG_DIR` env var: explicit override
    /// 3. Default: platform config dir (macOS: ~/Library/Application Support/scormrelay)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/scormrelay-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("SCORMRELAY_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("scormrelay")
                }
            }
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);
        let mut config = Self::load_from(&path).unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SCORMRELAY_COMPLETION_PATH") {
            self.completion_path = path;
        }

        if let Ok(seconds) = std::env::var("SCORMRELAY_AUTOCOMMIT_SECONDS") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                self.autocommit_seconds = seconds;
            }
        }

        if let Ok(seconds) = std::env::var("SCORMRELAY_DATA_MODEL_TIMEOUT_SECS") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                self.data_model_timeout_seconds = seconds;
            }
        }

        if let Ok(seconds) = std::env::var("SCORMRELAY_HTTP_TIMEOUT_SECS") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                self.http_timeout_seconds = seconds;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?.join(CONFIG_FILE))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;

        // Owner read/write only.
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// The read allowlist this configuration selects.
    pub fn allowlist(&self) -> ReadAllowlist {
        match &self.read_allowlist {
            Some(patterns) => ReadAllowlist::from_patterns(patterns.iter().map(String::as_str)),
            None => ReadAllowlist::scorm12(),
        }
    }

    /// Autocommit debounce window as a [`Duration`].
    pub fn autocommit_delay(&self) -> Duration {
        Duration::from_secs(self.autocommit_seconds)
    }

    /// Bounded data-model wait as a [`Duration`].
    pub fn data_model_timeout(&self) -> Duration {
        Duration::from_secs(self.data_model_timeout_seconds)
    }

    /// Completion HTTP request timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}
