//! Test doubles for the orchestrator's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::orchestrator::{Collaborators, HostLifecycle, Orchestrator, TriggerLoop};
use super::worker::{FeatureApp, FeatureWorker, HostContext, WorkerHandle};
use crate::connectivity::{ConnectivitySignals, SignalChannel};
use crate::models::{Error, FeatureDescriptor, FeatureId, Result};
use crate::permissions::PermissionCheck;
use crate::presence::{PresenceContent, PresenceIndicator};
use crate::storage::SettingsStore;

/// How a test worker behaves.
#[derive(Debug, Clone, Copy)]
pub enum WorkerMode {
    /// Starts and waits for stop.
    Idle,
    /// `start` returns an error.
    FailStart,
    /// `start` panics.
    PanicStart,
    /// Teardown takes this long.
    SlowStop(Duration),
    /// The context ends right after setup.
    ExitAfterCreate,
}

pub struct TestApp {
    mode: WorkerMode,
    destroyed: Arc<AtomicUsize>,
}

impl TestApp {
    pub fn new(mode: WorkerMode, destroyed: Arc<AtomicUsize>) -> Self {
        Self { mode, destroyed }
    }
}

#[async_trait]
impl FeatureApp for TestApp {
    async fn on_create(&mut self) -> Result<()> {
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        if let WorkerMode::ExitAfterCreate = self.mode {
            return Err(Error::Internal("worker gave up".to_string()));
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn on_destroy(&mut self) {
        if let WorkerMode::SlowStop(delay) = self.mode {
            tokio::time::sleep(delay).await;
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start/stop counters shared with a [`CountingWorker`].
#[derive(Clone, Default)]
pub struct WorkerProbe {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl WorkerProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Completed teardowns.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct CountingWorker {
    id: FeatureId,
    mode: WorkerMode,
    probe: WorkerProbe,
}

impl FeatureWorker for CountingWorker {
    fn start(&self, host: &HostContext) -> Result<WorkerHandle> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            WorkerMode::FailStart => Err(Error::start_failure(self.id, "refused")),
            WorkerMode::PanicStart => panic!("worker setup exploded"),
            mode => {
                let app = TestApp::new(mode, Arc::clone(&self.probe.stops));
                WorkerHandle::spawn(self.id, host, Box::new(app))
            }
        }
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, bool>>,
    reloads: AtomicUsize,
}

impl MemorySettings {
    pub fn set(&self, key: &str, value: bool) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemorySettings {
    fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_bool(&self, key: &str) -> bool {
        self.values.lock().unwrap().get(key).copied().unwrap_or(false)
    }
}

#[derive(Default)]
pub struct StaticPermission {
    granted: AtomicBool,
}

impl StaticPermission {
    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl PermissionCheck for StaticPermission {
    fn name(&self) -> &str {
        "static"
    }

    fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingPresence {
    shown: Mutex<Option<PresenceContent>>,
    last: Mutex<Option<PresenceContent>>,
}

impl RecordingPresence {
    pub fn is_shown(&self) -> bool {
        self.shown.lock().unwrap().is_some()
    }

    pub fn last_content(&self) -> Option<PresenceContent> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl PresenceIndicator for RecordingPresence {
    async fn show(&self, content: &PresenceContent) {
        *self.shown.lock().unwrap() = Some(content.clone());
        *self.last.lock().unwrap() = Some(content.clone());
    }

    async fn hide(&self) {
        self.shown.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct CountingHost {
    terminations: AtomicUsize,
}

impl CountingHost {
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl HostLifecycle for CountingHost {
    fn request_self_terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

/// An orchestrator wired to test doubles.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub head_unit: Arc<SignalChannel>,
    pub security: Arc<SignalChannel>,
    pub settings: Arc<MemorySettings>,
    pub notifications_permission: Arc<StaticPermission>,
    pub maps_permission: Arc<StaticPermission>,
    pub presence: Arc<RecordingPresence>,
    pub host: Arc<CountingHost>,
    pub notifications: WorkerProbe,
    pub maps: WorkerProbe,
    triggers: Mutex<Option<TriggerLoop>>,
}

impl Harness {
    pub fn new(notifications: WorkerMode, maps: WorkerMode) -> Self {
        Self::with_stop_timeout(notifications, maps, Duration::from_secs(2))
    }

    pub fn with_stop_timeout(
        notifications_mode: WorkerMode,
        maps_mode: WorkerMode,
        stop_timeout: Duration,
    ) -> Self {
        let head_unit = Arc::new(SignalChannel::new("head-unit"));
        let security = Arc::new(SignalChannel::new("security"));
        let settings = Arc::new(MemorySettings::default());
        let presence = Arc::new(RecordingPresence::default());
        let host = Arc::new(CountingHost::default());
        let notifications_permission = Arc::new(StaticPermission::default());
        let maps_permission = Arc::new(StaticPermission::default());
        let notifications = WorkerProbe::default();
        let maps = WorkerProbe::default();

        let features: Vec<(FeatureDescriptor, Arc<dyn FeatureWorker>)> = vec![
            (
                FeatureDescriptor::new(FeatureId::Notifications, notifications_permission.clone()),
                Arc::new(CountingWorker {
                    id: FeatureId::Notifications,
                    mode: notifications_mode,
                    probe: notifications.clone(),
                }),
            ),
            (
                FeatureDescriptor::new(FeatureId::Maps, maps_permission.clone()),
                Arc::new(CountingWorker {
                    id: FeatureId::Maps,
                    mode: maps_mode,
                    probe: maps.clone(),
                }),
            ),
        ];

        let collaborators = Collaborators {
            signals: ConnectivitySignals::new(head_unit.clone(), security.clone()),
            settings: settings.clone(),
            presence: presence.clone(),
            host: host.clone(),
        };
        let (orchestrator, triggers) = Orchestrator::new(collaborators, features, stop_timeout);

        Self {
            orchestrator,
            head_unit,
            security,
            settings,
            notifications_permission,
            maps_permission,
            presence,
            host,
            notifications,
            maps,
            triggers: Mutex::new(Some(triggers)),
        }
    }

    /// Take the trigger queue. Panics if already taken.
    pub fn take_triggers(&self) -> TriggerLoop {
        self.triggers
            .lock()
            .unwrap()
            .take()
            .expect("trigger loop already taken")
    }
}
