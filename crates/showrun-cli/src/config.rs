//! Configuration file support for showrun.
//!
//! Configuration is read from, in order:
//! - the file given with `--config`
//! - `showrun.toml` in the working directory
//! - the platform config directory (`~/.config/showrun/showrun.toml` on Linux)
//!
//! Every section is optional.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use showrun_core::{AutomationSettings, EngineConfig};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = "showrun.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub osc: OscSettings,
    pub http: HttpSettings,
    pub automation: AutomationSettings,
    pub restore: RestoreSettings,
}

/// Inbound OSC control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    pub enabled: bool,
    pub listen_port: u16,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: 8888,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 4001,
        }
    }
}

/// Restore point persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    pub enabled: bool,
    /// Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Config {
    /// Load the configuration. An explicit path must exist; otherwise the
    /// default locations are tried and defaults are used if none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::candidates().into_iter().find(|p| p.exists()),
        };
        let Some(path) = path else {
            log::info!("No config file found, using defaults");
            return Ok(Self::default());
        };
        let config = Self::from_file(&path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate TOML.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Restore file location, if one can be determined.
    pub fn restore_path(&self) -> Option<PathBuf> {
        self.restore.path.clone().or_else(|| {
            ProjectDirs::from("", "", "showrun").map(|dirs| dirs.data_dir().join("restore.json"))
        })
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("", "", "showrun") {
            paths.push(dirs.config_dir().join(FILE_NAME));
        }
        paths
    }
}
