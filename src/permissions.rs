// Head Unit Bridge - Permission Checks
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! OS-level authorization checks gating each feature.
//!
//! Grants are recorded in `permissions.toml` by whatever grants them
//! (a settings UI, a packaging hook, the user by hand). The file is
//! read on every check so a revocation is seen by the next evaluation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Answers whether a feature is currently authorized to run.
pub trait PermissionCheck: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether the permission is granted right now.
    fn is_granted(&self) -> bool;
}

/// Permissions a feature can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Access to the desktop notification stream.
    NotificationListener,
    /// Access to the device location.
    Location,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotificationListener => "notification_listener",
            Self::Location => "location",
        }
    }
}

/// On-disk grant table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrants {
    #[serde(default)]
    pub notification_listener: bool,
    #[serde(default)]
    pub location: bool,
}

impl PermissionGrants {
    pub fn is_granted(&self, permission: Permission) -> bool {
        match permission {
            Permission::NotificationListener => self.notification_listener,
            Permission::Location => self.location,
        }
    }

    /// Read the grant table. A missing file grants nothing.
    pub fn load(path: &Path) -> crate::models::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Permission backed by the grant table file.
#[derive(Debug, Clone)]
pub struct GrantFile {
    path: PathBuf,
    permission: Permission,
}

impl GrantFile {
    pub fn new(path: impl Into<PathBuf>, permission: Permission) -> Self {
        Self {
            path: path.into(),
            permission,
        }
    }
}

impl PermissionCheck for GrantFile {
    fn name(&self) -> &str {
        self.permission.as_str()
    }

    fn is_granted(&self) -> bool {
        match PermissionGrants::load(&self.path) {
            Ok(grants) => {
                let granted = grants.is_granted(self.permission);
                debug!("Permission {}: {}", self.permission.as_str(), granted);
                granted
            }
            Err(e) => {
                warn!("Failed to read permission grants {:?}: {}", self.path, e);
                false
            }
        }
    }
}
