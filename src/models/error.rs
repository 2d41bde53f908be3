// Head Unit Bridge - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the bridge.

use std::time::Duration;

use thiserror::Error;

use super::FeatureId;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Connectivity Errors
    // ========================================
    #[error("Connection signal unavailable: {channel} - {reason}")]
    SignalUnavailable { channel: String, reason: String },

    // ========================================
    // Feature Lifecycle Errors
    // ========================================
    #[error("Feature {feature} failed to start: {reason}")]
    FeatureStartFailure { feature: FeatureId, reason: String },

    #[error("Feature {feature} did not stop within {timeout:?}")]
    FeatureStopTimeout { feature: FeatureId, timeout: Duration },

    #[error("Evaluation abandoned: orchestrator is shutting down")]
    ConcurrentShutdownRace,

    // ========================================
    // D-Bus Errors
    // ========================================
    #[error("D-Bus error: {0}")]
    Dbus(String),

    #[error("D-Bus connection failed: {0}")]
    DbusConnectionFailed(String),

    // ========================================
    // Storage Errors
    // ========================================
    #[error("Failed to read configuration: {0}")]
    ConfigReadFailed(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWriteFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new start failure error.
    pub fn start_failure(feature: FeatureId, reason: impl Into<String>) -> Self {
        Self::FeatureStartFailure {
            feature,
            reason: reason.into(),
        }
    }

    /// Create a new signal unavailable error.
    pub fn signal_unavailable(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalUnavailable {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

}

// Convert from zbus errors
impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        Error::Dbus(err.to_string())
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigWriteFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
