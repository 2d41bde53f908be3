// Head Unit Bridge - Notification Mirroring
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Mirrors phone notifications to the head unit.
//!
//! Notifications are posted to a [`NotificationFeed`] whether or not
//! the feature runs. The feed keeps a short backlog so a freshly started
//! feature can draw the current notifications right away.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{CarLink, CarMessage};
use crate::models::{Error, FeatureId, Result};
use crate::services::{FeatureApp, FeatureWorker, HostContext, WorkerHandle};

/// Notifications kept for the initial draw.
const BACKLOG_LIMIT: usize = 20;

/// Live notifications buffered per subscriber.
const FEED_CAPACITY: usize = 64;

/// A notification as posted on the phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNotification {
    pub app: String,
    pub title: String,
    pub body: String,
}

/// Source of phone notifications.
pub struct NotificationFeed {
    tx: broadcast::Sender<PhoneNotification>,
    backlog: Mutex<VecDeque<PhoneNotification>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    /// Publish a notification.
    pub fn post(&self, notification: PhoneNotification) {
        {
            let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
            if backlog.len() == BACKLOG_LIMIT {
                backlog.pop_front();
            }
            backlog.push_back(notification.clone());
        }
        // No receivers just means the feature is not running.
        let _ = self.tx.send(notification);
    }

    /// Current backlog plus a receiver for everything posted after it.
    fn subscribe(&self) -> (Vec<PhoneNotification>, broadcast::Receiver<PhoneNotification>) {
        let backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        (backlog.iter().cloned().collect(), self.tx.subscribe())
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts the notification mirroring feature.
pub struct NotificationsWorker {
    feed: Arc<NotificationFeed>,
    link: Arc<dyn CarLink>,
}

impl NotificationsWorker {
    pub fn new(feed: Arc<NotificationFeed>, link: Arc<dyn CarLink>) -> Self {
        Self { feed, link }
    }
}

impl FeatureWorker for NotificationsWorker {
    fn start(&self, host: &HostContext) -> Result<WorkerHandle> {
        let app = NotificationsApp {
            feed: Arc::clone(&self.feed),
            link: Arc::clone(&self.link),
            rx: None,
            forwarded: 0,
        };
        WorkerHandle::spawn(FeatureId::Notifications, host, Box::new(app))
    }
}

struct NotificationsApp {
    feed: Arc<NotificationFeed>,
    link: Arc<dyn CarLink>,
    rx: Option<broadcast::Receiver<PhoneNotification>>,
    forwarded: u64,
}

#[async_trait]
impl FeatureApp for NotificationsApp {
    async fn on_create(&mut self) -> Result<()> {
        info!("Starting notifications app");
        let (backlog, rx) = self.feed.subscribe();
        debug!("Initial draw of {} notification(s)", backlog.len());
        for notification in backlog {
            self.link.send(CarMessage::Notification(notification));
        }
        self.rx = Some(rx);
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        let rx = self
            .rx
            .as_mut()
            .ok_or_else(|| Error::Internal("notification feed not subscribed".to_string()))?;

        match rx.recv().await {
            Ok(notification) => {
                self.forwarded += 1;
                self.link.send(CarMessage::Notification(notification));
                Ok(())
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Notification feed lagged, skipped {}", skipped);
                Ok(())
            }
            Err(broadcast::error::RecvError::Closed) => {
                Err(Error::Internal("notification feed closed".to_string()))
            }
        }
    }

    async fn on_destroy(&mut self) {
        self.rx = None;
        self.link.send(CarMessage::Cleared(FeatureId::Notifications));
        info!("Notifications app stopped after forwarding {}", self.forwarded);
    }
}
