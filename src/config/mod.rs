//! Configuration management for Vigil
//!
//! This module handles loading, parsing, and validating the validation
//! layer's configuration from TOML files: logging setup, finding output,
//! and per-subsystem check toggles.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration struct containing all Vigil settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VigilConfig {
    /// Logging and finding output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which validator families run
    #[serde(default)]
    pub checks: ChecksConfig,

    /// General layer behavior
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Logging and finding-output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log filter passed to env_logger when the environment does not
    /// override it (e.g. "info", "vigil=debug")
    pub filter: String,

    /// Optional JSON-lines file every finding is appended to
    pub finding_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            finding_log: None,
        }
    }
}

/// Per-subsystem check toggles. Handle tracking itself always runs; these
/// only gate the findings each validator family produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecksConfig {
    /// Session lifecycle and frame-loop checks
    pub sessions: bool,

    /// Swapchain image acquire/wait/release checks
    pub swapchains: bool,

    /// Action synchronization window checks
    pub actions: bool,

    /// Extension struct-chain integrity checks
    pub struct_chains: bool,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            sessions: true,
            swapchains: true,
            actions: true,
            struct_chains: true,
        }
    }
}

/// General layer behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Promote possibly-nonconformant findings to error severity
    pub strict: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { strict: false }
    }
}

impl VigilConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: VigilConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.filter.trim().is_empty() {
            anyhow::bail!("Invalid logging filter: must not be empty");
        }

        if let Some(path) = &self.logging.finding_log {
            if path.as_os_str().is_empty() {
                anyhow::bail!("Invalid finding_log path: must not be empty");
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
