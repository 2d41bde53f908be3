// Head Unit Bridge - Connectivity Signals
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The two connectivity signals gating every feature.
//!
//! Each channel reports its own status and fires a payload-less change
//! notification. Consumers always re-read both channels when notified;
//! the two channels can change in any order and several edges may be
//! folded into a single evaluation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::models::{ConnectionState, Error, Result, Vendor};

/// Callback fired whenever a channel's status changes.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// One externally driven "connected" signal.
pub trait ConnectionChannel: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Current status. An error means the channel cannot report.
    fn is_connected(&self) -> Result<bool>;

    /// Vendor of the connected peer, if the channel knows it.
    fn vendor_id(&self) -> Option<String> {
        None
    }

    /// Register the change listener, replacing any previous one.
    fn subscribe(&self, listener: ChangeListener);

    /// Drop the change listener.
    fn unsubscribe(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SignalStatus {
    /// `None` until the source has reported once.
    connected: Option<bool>,
    vendor: Option<String>,
}

/// In-process channel whose status is pushed by an external source.
pub struct SignalChannel {
    name: String,
    status: Mutex<SignalStatus>,
    listener: Mutex<Option<ChangeListener>>,
}

impl SignalChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Mutex::new(SignalStatus::default()),
            listener: Mutex::new(None),
        }
    }

    /// Report a new status. Fires the listener if anything changed.
    pub fn update(&self, connected: bool, vendor: Option<String>) {
        let changed = {
            let mut status = lock(&self.status);
            let changed = status.connected != Some(connected) || status.vendor != vendor;
            status.connected = Some(connected);
            status.vendor = vendor;
            changed
        };
        if changed {
            debug!("Signal {} changed: connected={}", self.name, connected);
            self.fire();
        }
    }

    /// Report a new connected flag, keeping the known vendor.
    pub fn set_connected(&self, connected: bool) {
        let vendor = lock(&self.status).vendor.clone();
        self.update(connected, vendor);
    }

    /// The source stopped reporting.
    pub fn mark_unavailable(&self) {
        let changed = lock(&self.status).connected.take().is_some();
        if changed {
            debug!("Signal {} became unavailable", self.name);
            self.fire();
        }
    }

    fn fire(&self) {
        // Clone out so the listener runs without our lock held.
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener();
        }
    }
}

impl ConnectionChannel for SignalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> Result<bool> {
        lock(&self.status)
            .connected
            .ok_or_else(|| Error::signal_unavailable(&self.name, "no status reported"))
    }

    fn vendor_id(&self) -> Option<String> {
        lock(&self.status).vendor.clone()
    }

    fn subscribe(&self, listener: ChangeListener) {
        *lock(&self.listener) = Some(listener);
    }

    fn unsubscribe(&self) {
        lock(&self.listener).take();
    }
}

/// The head-unit link and the security service, combined by AND.
#[derive(Clone)]
pub struct ConnectivitySignals {
    head_unit: Arc<dyn ConnectionChannel>,
    security: Arc<dyn ConnectionChannel>,
}

impl ConnectivitySignals {
    pub fn new(head_unit: Arc<dyn ConnectionChannel>, security: Arc<dyn ConnectionChannel>) -> Self {
        Self {
            head_unit,
            security,
        }
    }

    /// Read both channels now. Unavailable channels read as disconnected.
    pub fn read(&self) -> ConnectionState {
        let head_unit = Self::read_channel(self.head_unit.as_ref());
        let security = Self::read_channel(self.security.as_ref());
        let vendor = Vendor::from_brand(self.head_unit.vendor_id().as_deref());
        ConnectionState {
            head_unit,
            security,
            vendor,
        }
    }

    fn read_channel(channel: &dyn ConnectionChannel) -> bool {
        match channel.is_connected() {
            Ok(connected) => connected,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Route change notifications from both channels to one listener.
    pub fn subscribe(&self, listener: ChangeListener) {
        debug!(
            "Listening to {} and {}",
            self.head_unit.name(),
            self.security.name()
        );
        self.head_unit.subscribe(Arc::clone(&listener));
        self.security.subscribe(listener);
    }

    pub fn unsubscribe(&self) {
        self.head_unit.unsubscribe();
        self.security.unsubscribe();
    }
}
