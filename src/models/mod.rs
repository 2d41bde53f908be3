// Head Unit Bridge - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Shared Models
//!
//! Types shared by the orchestrator, the feature workers and the
//! D-Bus surface:
//!
//! - **Config**: user settings persisted as TOML
//! - **Feature**: static feature descriptors and their setting keys
//! - **Connection**: connectivity snapshot and head-unit vendor
//! - **Error**: shared error types

pub mod config;
pub mod connection;
pub mod error;
pub mod feature;

pub use config::{AppConfig, MapsConfig};
pub use connection::{ConnectionState, Vendor};
pub use error::{Error, Result};
pub use feature::{FeatureDescriptor, FeatureId, FeatureState};

/// Application ID (matches D-Bus identifiers).
pub const APP_ID: &str = "org.headunitbridge.Bridge";

/// D-Bus well-known name for the command surface.
pub const DBUS_SERVICE_NAME: &str = "org.headunitbridge.Bridge";

/// D-Bus object path for the command surface.
pub const DBUS_OBJECT_PATH: &str = "/org/headunitbridge/Bridge";

/// Configuration directory name (under XDG_CONFIG_HOME).
pub const CONFIG_DIR_NAME: &str = "headunit-bridge";

/// Setting key enabling the notifications feature.
pub const ENABLED_NOTIFICATIONS: &str = "enabled_notifications";

/// Setting key enabling the maps feature.
pub const ENABLED_MAPS: &str = "enabled_maps";
