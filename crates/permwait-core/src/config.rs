//! Configuration resolution for permwait.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/permwait/settings.json)
//! 3. Project config (.permwait/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete permwait configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the simulated host platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Platform SDK level reported to the delegate.
    pub sdk_level: u32,
    /// Permissions the platform reports as already granted.
    pub pre_granted: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sdk_level: 34,
            pre_granted: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    load_config_from(global_config_path().as_deref(), project_dir)
}

/// Resolve configuration from an explicit global settings file and an
/// optional project directory.
pub fn load_config_from(global_path: Option<&Path>, project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path
        && global_path.exists()
    {
        let global = load_config_file(global_path)?;
        merge_config(&mut config, global);
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".permwait").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".permwait").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/permwait/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("permwait").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// One settings file as written on disk; absent keys leave lower layers intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub host: HostOverlay,
    pub logging: LoggingOverlay,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOverlay {
    pub sdk_level: Option<u32>,
    pub pre_granted: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOverlay {
    pub level: Option<String>,
    pub json: Option<bool>,
}

/// Read and parse a single settings file.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigFile) {
    if let Some(sdk_level) = overlay.host.sdk_level {
        base.host.sdk_level = sdk_level;
    }
    for permission in overlay.host.pre_granted {
        if !base.host.pre_granted.contains(&permission) {
            base.host.pre_granted.push(permission);
        }
    }

    if let Some(level) = overlay.logging.level {
        base.logging.level = level;
    }
    if let Some(json) = overlay.logging.json {
        base.logging.json = json;
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("PERMWAIT_SDK_LEVEL")
        && let Ok(n) = val.parse()
    {
        config.host.sdk_level = n;
    }
    if let Ok(val) = std::env::var("PERMWAIT_PRE_GRANTED") {
        config.host.pre_granted.extend(
            val.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        );
    }
    if let Ok(val) = std::env::var("PERMWAIT_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var("PERMWAIT_LOG_JSON") {
        config.logging.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}
