// Head Unit Bridge - Feature Descriptors
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Static description of the features the bridge can run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionCheck;

/// Identifier of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureId {
    /// Phone notification mirroring.
    Notifications,
    /// Map projection onto the head unit.
    Maps,
}

impl FeatureId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Maps => "maps",
        }
    }

    /// Setting key that enables this feature.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::Notifications => super::ENABLED_NOTIFICATIONS,
            Self::Maps => super::ENABLED_MAPS,
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a feature currently owns a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureState {
    Stopped,
    Running,
}

/// Immutable description of a feature, built once at startup.
#[derive(Clone)]
pub struct FeatureDescriptor {
    pub id: FeatureId,
    pub setting_key: &'static str,
    pub permission: Arc<dyn PermissionCheck>,
}

impl FeatureDescriptor {
    /// Describe a feature gated by its standard setting key.
    pub fn new(id: FeatureId, permission: Arc<dyn PermissionCheck>) -> Self {
        Self {
            id,
            setting_key: id.setting_key(),
            permission,
        }
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("id", &self.id)
            .field("setting_key", &self.setting_key)
            .field("permission", &self.permission.name())
            .finish()
    }
}
