// Head Unit Bridge - D-Bus Command Surface
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! D-Bus command surface.
//!
//! Exposes the bridge on the session bus so the connectivity sources,
//! the notification source and the user can drive it:
//!
//! ```text
//! busctl --user call org.headunitbridge.Bridge /org/headunitbridge/Bridge \
//!     org.headunitbridge.Bridge1 SetHeadUnitConnected bs true BMW
//! ```
//!
//! Lifecycle commands are forwarded to the application loop. Signal
//! and notification updates are applied directly; the channels notify
//! the orchestrator themselves.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use zbus::{fdo, interface, Connection};

use crate::connectivity::SignalChannel;
use crate::features::{NotificationFeed, PhoneNotification};
use crate::models::{Error, Result, DBUS_OBJECT_PATH, DBUS_SERVICE_NAME};
use crate::services::Orchestrator;

/// Lifecycle commands sent from the bus to the application loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Begin listening and evaluating.
    Start,
    /// Stop every feature and stop listening.
    Stop,
    /// Settings or permissions changed externally.
    ReloadSettings,
}

/// D-Bus interface for controlling the bridge.
pub struct BridgeInterface {
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    head_unit: Arc<SignalChannel>,
    security: Arc<SignalChannel>,
    feed: Arc<NotificationFeed>,
    orchestrator: Arc<Orchestrator>,
}

impl BridgeInterface {
    pub fn new(
        command_tx: mpsc::UnboundedSender<BridgeCommand>,
        head_unit: Arc<SignalChannel>,
        security: Arc<SignalChannel>,
        feed: Arc<NotificationFeed>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            command_tx,
            head_unit,
            security,
            feed,
            orchestrator,
        }
    }

    fn send(&self, command: BridgeCommand) -> fdo::Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| fdo::Error::Failed("bridge is shutting down".to_string()))
    }

    fn channel(&self, name: &str) -> fdo::Result<&SignalChannel> {
        match name {
            "head-unit" => Ok(self.head_unit.as_ref()),
            "security" => Ok(self.security.as_ref()),
            other => Err(fdo::Error::InvalidArgs(format!("unknown channel '{}'", other))),
        }
    }
}

#[interface(name = "org.headunitbridge.Bridge1")]
impl BridgeInterface {
    /// Start listening to the connectivity channels.
    async fn start(&self) -> fdo::Result<()> {
        self.send(BridgeCommand::Start)
    }

    /// Stop every feature and stop listening.
    async fn stop(&self) -> fdo::Result<()> {
        self.send(BridgeCommand::Stop)
    }

    /// Re-evaluate after settings or permissions changed.
    async fn reload_settings(&self) -> fdo::Result<()> {
        self.send(BridgeCommand::ReloadSettings)
    }

    /// Report the head-unit link state. An empty brand means unknown.
    async fn set_head_unit_connected(&self, connected: bool, brand: &str) {
        debug!("Head unit connected={} brand={:?}", connected, brand);
        let vendor = (!brand.is_empty()).then(|| brand.to_string());
        self.head_unit.update(connected, vendor);
    }

    /// Report the security service state.
    async fn set_security_connected(&self, connected: bool) {
        debug!("Security connected={}", connected);
        self.security.set_connected(connected);
    }

    /// Mark a channel as unreadable ("head-unit" or "security").
    async fn signal_lost(&self, channel: &str) -> fdo::Result<()> {
        self.channel(channel)?.mark_unavailable();
        Ok(())
    }

    /// Post a phone notification for mirroring.
    async fn post_notification(&self, app: &str, title: &str, body: &str) {
        self.feed.post(PhoneNotification {
            app: app.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    /// Current orchestrator state as JSON.
    async fn status(&self) -> fdo::Result<String> {
        let snapshot = self.orchestrator.status().await;
        serde_json::to_string(&snapshot).map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

/// Open a connection to the session bus.
pub async fn session_connection() -> Result<Connection> {
    Connection::session()
        .await
        .map_err(|e| Error::DbusConnectionFailed(e.to_string()))
}

/// Serve the interface and claim the well-known name.
pub async fn start_bus(connection: &Connection, interface: BridgeInterface) -> Result<()> {
    connection
        .object_server()
        .at(DBUS_OBJECT_PATH, interface)
        .await?;
    connection.request_name(DBUS_SERVICE_NAME).await?;

    info!("Serving {} on the session bus", DBUS_SERVICE_NAME);
    Ok(())
}
