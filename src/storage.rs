// Head Unit Bridge - Local Storage
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Settings storage.
//!
//! Handles:
//! - Locating the configuration directory
//! - Loading and saving `settings.toml`
//! - Serving point-in-time boolean reads to the orchestrator
//!
//! This module uses RwLock for thread-safe access. Lock poisoning is handled
//! gracefully by recovering the inner value, as poison indicates a panic
//! in another thread but the data itself may still be valid.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::models::{AppConfig, Result, CONFIG_DIR_NAME};

/// Reloadable source of user settings.
pub trait SettingsStore: Send + Sync {
    /// Re-read the backing store. On failure the previous snapshot stays in place.
    fn reload(&self) -> Result<()>;

    /// Read a boolean setting from the current snapshot. Unknown keys read as false.
    fn get_bool(&self, key: &str) -> bool;
}

/// File-backed settings store.
#[derive(Debug)]
pub struct DataStore {
    /// Configuration directory path.
    config_dir: PathBuf,
    /// Settings file path.
    settings_file: PathBuf,
    /// Permission grants file path.
    permissions_file: PathBuf,
    /// Last successfully loaded settings.
    settings: RwLock<AppConfig>,
}

impl DataStore {
    /// Default configuration directory under XDG_CONFIG_HOME.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
    }

    /// Create a new data store with a specific config directory.
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&config_dir) {
            error!("Failed to create config directory: {}", e);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&config_dir, fs::Permissions::from_mode(0o700));
        }

        let store = Self {
            settings_file: config_dir.join("settings.toml"),
            permissions_file: config_dir.join("permissions.toml"),
            config_dir,
            settings: RwLock::new(AppConfig::default()),
        };

        if let Err(e) = store.load_settings() {
            error!("Failed to load settings: {}", e);
        }
        store
    }

    // ========================================================================
    // RwLock Helper Methods (handle poisoning gracefully)
    // ========================================================================

    fn read_settings<R>(&self, reader: impl FnOnce(&AppConfig) -> R) -> R {
        match self.settings.read() {
            Ok(guard) => reader(&guard),
            Err(poisoned) => {
                warn!("RwLock poisoned reading settings, recovering");
                reader(&poisoned.into_inner())
            }
        }
    }

    fn write_settings(&self, writer: impl FnOnce(&mut AppConfig)) {
        match self.settings.write() {
            Ok(mut guard) => writer(&mut guard),
            Err(poisoned) => {
                warn!("RwLock poisoned writing settings, recovering");
                writer(&mut poisoned.into_inner())
            }
        }
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Parse the settings file and swap it in whole.
    fn load_settings(&self) -> Result<()> {
        if !self.settings_file.exists() {
            debug!("No settings file at {:?}, using defaults", self.settings_file);
            self.write_settings(|s| *s = AppConfig::default());
            return Ok(());
        }

        let config = AppConfig::load_from_file(&self.settings_file)?;
        self.write_settings(|s| *s = config);
        info!("Loaded settings from {:?}", self.settings_file);
        Ok(())
    }

    /// Get the current settings.
    pub fn settings(&self) -> AppConfig {
        self.read_settings(|s| s.clone())
    }

    /// Replace the settings and persist them.
    pub fn update_settings(&self, settings: AppConfig) -> Result<()> {
        settings.save_to_file(&self.settings_file)?;
        self.write_settings(|s| *s = settings);
        Ok(())
    }

    /// Write the current settings out if no settings file exists yet,
    /// so users have a file to edit.
    pub fn ensure_settings_file(&self) -> Result<()> {
        if self.settings_file.exists() {
            return Ok(());
        }
        info!("Creating default settings at {:?}", self.settings_file);
        self.update_settings(self.settings())
    }

    /// Get the config directory path.
    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    /// Get the permission grants file path.
    pub fn permissions_file(&self) -> &PathBuf {
        &self.permissions_file
    }
}

impl SettingsStore for DataStore {
    fn reload(&self) -> Result<()> {
        self.load_settings()
    }

    fn get_bool(&self, key: &str) -> bool {
        self.read_settings(|s| match s.get_bool(key) {
            Some(value) => value,
            None => {
                warn!("Unknown setting key '{}', treating as disabled", key);
                false
            }
        })
    }
}
