// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for downwatch
//!
//! Stored as JSON at `~/.downwatch/config.json`. Every field has a default,
//! so a missing file or a partial file is fine. Command-line flags are
//! applied on top with [`Config::apply_overrides`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

const CONFIG_DIR_NAME: &str = ".downwatch";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Verification window after downloads go idle (seconds)
    #[serde(default = "default_verification_delay")]
    pub verification_delay_secs: u64,
    /// Seconds between polls while monitoring and verifying
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    /// Consecutive idle polls needed to confirm completion
    #[serde(default = "default_required_idle_checks")]
    pub required_idle_checks: u32,
    /// Delay handed to the OS shutdown command (seconds)
    #[serde(default = "default_shutdown_delay")]
    pub shutdown_delay_secs: u64,
    /// Log what would happen instead of shutting down
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub steam_enabled: bool,
    #[serde(default = "default_true")]
    pub epic_enabled: bool,
    /// Steam install root override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_path: Option<PathBuf>,
    /// Epic data root override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_path: Option<PathBuf>,
}

fn default_verification_delay() -> u64 {
    300
}

fn default_polling_interval() -> u64 {
    30
}

fn default_required_idle_checks() -> u32 {
    3
}

fn default_shutdown_delay() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verification_delay_secs: default_verification_delay(),
            polling_interval_secs: default_polling_interval(),
            required_idle_checks: default_required_idle_checks(),
            shutdown_delay_secs: default_shutdown_delay(),
            dry_run: false,
            steam_enabled: true,
            epic_enabled: true,
            steam_path: None,
            epic_path: None,
        }
    }
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub verification_delay_secs: Option<u64>,
    pub polling_interval_secs: Option<u64>,
    pub required_idle_checks: Option<u32>,
    pub shutdown_delay_secs: Option<u64>,
    pub dry_run: bool,
    pub steam_path: Option<PathBuf>,
    pub epic_path: Option<PathBuf>,
    pub no_steam: bool,
    pub no_epic: bool,
}

impl Config {
    pub fn verification_delay(&self) -> Duration {
        Duration::from_secs(self.verification_delay_secs)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Reject values that would make monitoring meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.verification_delay_secs == 0 {
            return Err(WatchError::Config("verification delay must be greater than 0".to_string()));
        }
        if self.polling_interval_secs == 0 {
            return Err(WatchError::Config("polling interval must be greater than 0".to_string()));
        }
        if self.required_idle_checks == 0 {
            return Err(WatchError::Config("required idle checks must be greater than 0".to_string()));
        }
        if self.shutdown_delay_secs == 0 {
            return Err(WatchError::Config("shutdown delay must be greater than 0".to_string()));
        }
        if !self.steam_enabled && !self.epic_enabled {
            return Err(WatchError::Config("every launcher is disabled".to_string()));
        }
        Ok(())
    }

    /// Non-fatal problems with otherwise valid values.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let needed = u64::from(self.required_idle_checks).saturating_mul(self.polling_interval_secs);
        if needed > self.verification_delay_secs {
            warnings.push(format!(
                "{} idle checks every {}s cannot fit in the {}s verification delay; the delay will end verification first",
                self.required_idle_checks, self.polling_interval_secs, self.verification_delay_secs
            ));
        }
        warnings
    }

    /// Apply command-line values on top of this config.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.verification_delay_secs {
            self.verification_delay_secs = v;
        }
        if let Some(v) = overrides.polling_interval_secs {
            self.polling_interval_secs = v;
        }
        if let Some(v) = overrides.required_idle_checks {
            self.required_idle_checks = v;
        }
        if let Some(v) = overrides.shutdown_delay_secs {
            self.shutdown_delay_secs = v;
        }
        if overrides.dry_run {
            self.dry_run = true;
        }
        if let Some(path) = &overrides.steam_path {
            self.steam_path = Some(path.clone());
        }
        if let Some(path) = &overrides.epic_path {
            self.epic_path = Some(path.clone());
        }
        if overrides.no_steam {
            self.steam_enabled = false;
        }
        if overrides.no_epic {
            self.epic_enabled = false;
        }
    }
}

/// `~/.downwatch`
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WatchError::Config("could not find home directory".to_string()))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Default config file location.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load from `path`, or defaults when the file does not exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)
        .map_err(|e| WatchError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&default_config_path()?)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
