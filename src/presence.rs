// Head Unit Bridge - Presence Indicator
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Presence indicator shown while at least one feature runs.
//!
//! The desktop backend keeps a single resident, low-urgency notification
//! on screen through `org.freedesktop.Notifications`, replacing it in
//! place on every show and closing it on hide.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zbus::zvariant::Value;
use zbus::Connection;

use crate::models::{Result, Vendor};

/// What the presence indicator displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceContent {
    pub title: String,
    pub body: String,
}

impl PresenceContent {
    /// Content for the connected head-unit vendor.
    pub fn for_vendor(vendor: Vendor) -> Self {
        let body = match vendor {
            Vendor::Bmw => "Connected to your BMW",
            Vendor::Mini => "Connected to your MINI",
            Vendor::Unknown => "Connected to your car",
        };
        Self {
            title: "Head Unit Bridge".to_string(),
            body: body.to_string(),
        }
    }
}

/// Sink for the externally visible "running" marker.
#[async_trait]
pub trait PresenceIndicator: Send + Sync {
    /// Show or refresh the indicator.
    async fn show(&self, content: &PresenceContent);

    /// Remove the indicator. Must be safe when nothing is shown.
    async fn hide(&self);
}

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    fn close_notification(&self, id: u32) -> zbus::Result<()>;
}

/// Resident desktop notification.
pub struct DesktopPresence {
    proxy: NotificationsProxy<'static>,
    notification_id: Mutex<Option<u32>>,
}

impl DesktopPresence {
    /// Bind to the notification daemon on the given session bus.
    pub async fn connect(connection: &Connection) -> Result<Self> {
        let proxy = NotificationsProxy::new(connection).await?;
        Ok(Self {
            proxy,
            notification_id: Mutex::new(None),
        })
    }
}

#[async_trait]
impl PresenceIndicator for DesktopPresence {
    async fn show(&self, content: &PresenceContent) {
        let mut id = self.notification_id.lock().await;

        let mut hints = HashMap::new();
        hints.insert("resident", Value::from(true));
        hints.insert("urgency", Value::from(0u8));

        let result = self
            .proxy
            .notify(
                crate::models::APP_ID,
                id.unwrap_or(0),
                "network-transmit-receive",
                &content.title,
                &content.body,
                &[],
                hints,
                0,
            )
            .await;

        match result {
            Ok(new_id) => {
                if id.is_none() {
                    info!("Showing presence notification");
                }
                *id = Some(new_id);
            }
            Err(e) => warn!("Failed to show presence notification: {}", e),
        }
    }

    async fn hide(&self) {
        let Some(id) = self.notification_id.lock().await.take() else {
            return;
        };
        info!("Hiding presence notification");
        if let Err(e) = self.proxy.close_notification(id).await {
            warn!("Failed to close presence notification {}: {}", id, e);
        }
    }
}

/// Presence that only logs. Used without a session bus or with presence disabled.
#[derive(Debug, Default)]
pub struct LogPresence {
    shown: Mutex<Option<PresenceContent>>,
}

#[async_trait]
impl PresenceIndicator for LogPresence {
    async fn show(&self, content: &PresenceContent) {
        let mut shown = self.shown.lock().await;
        if shown.as_ref() != Some(content) {
            info!("Presence: {} - {}", content.title, content.body);
        }
        *shown = Some(content.clone());
    }

    async fn hide(&self) {
        if self.shown.lock().await.take().is_some() {
            debug!("Presence hidden");
        }
    }
}
