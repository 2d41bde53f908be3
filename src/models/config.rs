// Head Unit Bridge - Application Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Application configuration model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Map projection capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapsConfig {
    /// Capture surface width in pixels.
    #[serde(default = "default_maps_width")]
    pub width: u32,

    /// Capture surface height in pixels.
    #[serde(default = "default_maps_height")]
    pub height: u32,

    /// Interval between captured frames.
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            width: default_maps_width(),
            height: default_maps_height(),
            frame_interval_ms: default_frame_interval(),
        }
    }
}

impl MapsConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn default_maps_width() -> u32 {
    1000
}

fn default_maps_height() -> u32 {
    400
}

fn default_frame_interval() -> u64 {
    100
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Mirror phone notifications to the car.
    #[serde(default)]
    pub enabled_notifications: bool,

    /// Project maps onto the car display.
    #[serde(default)]
    pub enabled_maps: bool,

    /// Upper bound on waiting for a feature to acknowledge stop.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Exit the process when nothing is running.
    #[serde(default)]
    pub exit_when_idle: bool,

    /// Issue a start request as soon as the daemon is up.
    #[serde(default = "default_true")]
    pub start_on_launch: bool,

    /// Show a desktop notification while features run.
    #[serde(default = "default_true")]
    pub presence: bool,

    /// Map capture settings.
    #[serde(default)]
    pub maps: MapsConfig,
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled_notifications: false,
            enabled_maps: false,
            stop_timeout_ms: default_stop_timeout(),
            log_level: default_log_level(),
            exit_when_idle: false,
            start_on_launch: true,
            presence: true,
            maps: MapsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Look up a feature enable flag by setting key.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match key {
            super::ENABLED_NOTIFICATIONS => Some(self.enabled_notifications),
            super::ENABLED_MAPS => Some(self.enabled_maps),
            _ => None,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Load configuration from TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| super::Error::ConfigReadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file with restrictive permissions (0600).
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), super::Error> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}
