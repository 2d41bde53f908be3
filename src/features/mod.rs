// Head Unit Bridge - Features
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Features the orchestrator can run.
//!
//! Each feature is a [`FeatureWorker`](crate::services::FeatureWorker)
//! whose app runs on its own worker context and talks to the car only
//! through a [`CarLink`].

pub mod maps;
pub mod notifications;

pub use maps::MapsWorker;
pub use notifications::{NotificationFeed, NotificationsWorker, PhoneNotification};

use tracing::{debug, info};

use crate::models::FeatureId;

/// Message bound for the head unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarMessage {
    /// A phone notification to display.
    Notification(PhoneNotification),
    /// A captured map frame.
    MapFrame {
        sequence: u64,
        width: u32,
        height: u32,
        bytes: usize,
    },
    /// The feature went away; the head unit should clear its views.
    Cleared(FeatureId),
}

/// Outbound path to the head unit.
pub trait CarLink: Send + Sync {
    fn send(&self, message: CarMessage);
}

/// Link that records traffic in the log.
#[derive(Debug, Default)]
pub struct LogLink;

impl CarLink for LogLink {
    fn send(&self, message: CarMessage) {
        match message {
            CarMessage::Notification(n) => {
                info!(target: "car", app = %n.app, "Notification: {}", n.title)
            }
            CarMessage::MapFrame {
                sequence,
                width,
                height,
                bytes,
            } => debug!(target: "car", "Map frame {} ({}x{}, {} bytes)", sequence, width, height, bytes),
            CarMessage::Cleared(feature) => info!(target: "car", "Cleared {}", feature),
        }
    }
}
