// Head Unit Bridge - Feature Orchestrator
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Decides which features run and drives their worker contexts.
//!
//! A feature runs only while both connectivity signals are up and its
//! own setting and permission allow it. Every pass re-reads the signals
//! and reloads settings, then starts or stops each feature independently.
//! The whole pass runs under one lock, so a feature never sees
//! overlapping start/stop requests.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::worker::{FeatureWorker, HostContext, WorkerHandle};
use crate::connectivity::{ChangeListener, ConnectivitySignals};
use crate::models::{
    ConnectionState, Error, FeatureDescriptor, FeatureId, FeatureState, Result,
};
use crate::presence::{PresenceContent, PresenceIndicator};
use crate::storage::SettingsStore;

/// Reason the orchestrator was asked to look again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// One of the connectivity channels changed.
    SignalChanged,
    /// Settings or permissions were changed externally.
    SettingsChanged,
    /// A worker context ended without being asked to.
    WorkerExited(FeatureId),
}

pub type TriggerSender = mpsc::UnboundedSender<Trigger>;

/// The process hosting the orchestrator.
pub trait HostLifecycle: Send + Sync {
    /// Nothing is running and nothing needs the process alive.
    fn request_self_terminate(&self);
}

/// Whether the orchestrator is listening to the connectivity channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Not started yet.
    Idle,
    /// Subscribed and evaluating.
    Listening,
    /// Stopped by a stop request.
    ShutDown,
}

/// Collaborators the orchestrator consumes.
pub struct Collaborators {
    pub signals: ConnectivitySignals,
    pub settings: Arc<dyn SettingsStore>,
    pub presence: Arc<dyn PresenceIndicator>,
    pub host: Arc<dyn HostLifecycle>,
}

struct FeatureRuntime {
    descriptor: FeatureDescriptor,
    worker: Arc<dyn FeatureWorker>,
    handle: Option<WorkerHandle>,
}

impl FeatureRuntime {
    fn state(&self) -> FeatureState {
        if self.handle.is_some() {
            FeatureState::Running
        } else {
            FeatureState::Stopped
        }
    }
}

struct OrchestratorState {
    lifecycle: Lifecycle,
    connection: ConnectionState,
    features: BTreeMap<FeatureId, FeatureRuntime>,
    presence_shown: bool,
}

impl OrchestratorState {
    fn any_running(&self) -> bool {
        self.features.values().any(|f| f.handle.is_some())
    }
}

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub started: Vec<FeatureId>,
    pub stopped: Vec<FeatureId>,
    pub failed: Vec<FeatureId>,
    pub any_running: bool,
}

impl EvaluationReport {
    pub fn is_unchanged(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.failed.is_empty()
    }
}

/// Per-feature entry of [`StatusSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureStatus {
    pub id: FeatureId,
    pub state: FeatureState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub lifecycle: Lifecycle,
    pub connection: ConnectionState,
    pub features: Vec<FeatureStatus>,
    pub presence_shown: bool,
}

impl StatusSnapshot {
    pub fn feature_state(&self, id: FeatureId) -> Option<FeatureState> {
        self.features.iter().find(|f| f.id == id).map(|f| f.state)
    }
}

/// Connection-gated feature lifecycle manager.
pub struct Orchestrator {
    state: Mutex<OrchestratorState>,
    /// Shutdowns that have begun but not finished. Any pass that sees a
    /// non-zero count abandons itself.
    pending_shutdowns: AtomicUsize,
    signals: ConnectivitySignals,
    settings: Arc<dyn SettingsStore>,
    presence: Arc<dyn PresenceIndicator>,
    host: Arc<dyn HostLifecycle>,
    stop_timeout: Duration,
    triggers: TriggerSender,
}

impl Orchestrator {
    /// Create an orchestrator with every feature stopped.
    pub fn new(
        collaborators: Collaborators,
        features: Vec<(FeatureDescriptor, Arc<dyn FeatureWorker>)>,
        stop_timeout: Duration,
    ) -> (Arc<Self>, TriggerLoop) {
        let (tx, rx) = mpsc::unbounded_channel();

        let features = features
            .into_iter()
            .map(|(descriptor, worker)| {
                let runtime = FeatureRuntime {
                    descriptor,
                    worker,
                    handle: None,
                };
                (runtime.descriptor.id, runtime)
            })
            .collect();

        let orchestrator = Arc::new(Self {
            state: Mutex::new(OrchestratorState {
                lifecycle: Lifecycle::Idle,
                connection: ConnectionState::default(),
                features,
                presence_shown: false,
            }),
            pending_shutdowns: AtomicUsize::new(0),
            signals: collaborators.signals,
            settings: collaborators.settings,
            presence: collaborators.presence,
            host: collaborators.host,
            stop_timeout,
            triggers: tx,
        });

        (orchestrator, TriggerLoop { rx })
    }

    fn shutdown_pending(&self) -> bool {
        self.pending_shutdowns.load(Ordering::SeqCst) > 0
    }

    /// Begin listening to both channels and run a first pass.
    pub async fn start(&self) -> Result<EvaluationReport> {
        let mut state = self.state.lock().await;

        if state.lifecycle != Lifecycle::Listening {
            info!("Starting orchestrator, subscribing to connectivity signals");
            let triggers = self.triggers.clone();
            let listener: ChangeListener = Arc::new(move || {
                let _ = triggers.send(Trigger::SignalChanged);
            });
            self.signals.subscribe(listener);
            state.lifecycle = Lifecycle::Listening;
        } else {
            debug!("Orchestrator already listening");
        }

        if self.shutdown_pending() {
            return Err(Error::ConcurrentShutdownRace);
        }
        Ok(self.evaluate_locked(&mut state).await)
    }

    /// Queue a pass, e.g. after settings changed externally.
    pub fn request_evaluation(&self) {
        let _ = self.triggers.send(Trigger::SettingsChanged);
    }

    /// Recompute desired state and start/stop features to match.
    pub async fn evaluate(&self) -> Result<EvaluationReport> {
        if self.shutdown_pending() {
            debug!("Evaluation abandoned before locking: shutdown in progress");
            return Err(Error::ConcurrentShutdownRace);
        }

        let mut state = self.state.lock().await;
        if self.shutdown_pending() || state.lifecycle == Lifecycle::ShutDown {
            debug!("Evaluation abandoned: orchestrator shut down");
            return Err(Error::ConcurrentShutdownRace);
        }
        if state.lifecycle == Lifecycle::Idle {
            debug!("Evaluation skipped: orchestrator not started");
            return Ok(EvaluationReport::default());
        }

        Ok(self.evaluate_locked(&mut state).await)
    }

    async fn evaluate_locked(&self, state: &mut OrchestratorState) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        self.reap_exited(state, &mut report);

        let connection = self.signals.read();
        state.connection = connection;

        if !connection.is_connected() {
            debug!(
                "Not fully connected: head unit {} security {}",
                connection.head_unit, connection.security
            );
            // Reaped contexts were running as far as this pass began.
            let was_running = !report.stopped.is_empty() || state.any_running();
            for runtime in state.features.values_mut() {
                self.stop_feature(runtime, &mut report).await;
            }
            self.hide_presence(state).await;
            if was_running {
                self.host.request_self_terminate();
            }
            return report;
        }

        if let Err(e) = self.settings.reload() {
            warn!("Settings reload failed, keeping previous snapshot: {}", e);
        }

        for runtime in state.features.values_mut() {
            let descriptor = &runtime.descriptor;
            let desired =
                self.settings.get_bool(descriptor.setting_key) && descriptor.permission.is_granted();

            match (desired, runtime.handle.is_some()) {
                (true, false) => self.start_feature(runtime, &mut report),
                (false, true) => {
                    info!("Feature {} no longer enabled, shutting it down", runtime.descriptor.id);
                    self.stop_feature(runtime, &mut report).await;
                }
                _ => {}
            }
        }

        report.any_running = state.any_running();
        if report.any_running {
            let content = PresenceContent::for_vendor(connection.vendor);
            self.presence.show(&content).await;
            state.presence_shown = true;
        } else {
            info!("No features enabled, nothing to run");
            self.hide_presence(state).await;
            self.host.request_self_terminate();
        }

        report
    }

    /// Forget contexts that ended on their own. Does not restart them.
    pub async fn reap(&self) -> Result<EvaluationReport> {
        if self.shutdown_pending() {
            return Err(Error::ConcurrentShutdownRace);
        }

        let mut state = self.state.lock().await;
        if state.lifecycle != Lifecycle::Listening {
            return Ok(EvaluationReport::default());
        }

        let mut report = EvaluationReport::default();
        self.reap_exited(&mut state, &mut report);
        report.any_running = state.any_running();

        if !report.stopped.is_empty() && !report.any_running {
            self.hide_presence(&mut state).await;
            self.host.request_self_terminate();
        }
        Ok(report)
    }

    fn reap_exited(&self, state: &mut OrchestratorState, report: &mut EvaluationReport) {
        for runtime in state.features.values_mut() {
            if runtime.handle.as_ref().is_some_and(|h| !h.is_alive()) {
                warn!("Feature {} worker is gone, marking it stopped", runtime.descriptor.id);
                runtime.handle = None;
                report.stopped.push(runtime.descriptor.id);
            }
        }
    }

    fn start_feature(&self, runtime: &mut FeatureRuntime, report: &mut EvaluationReport) {
        if runtime.handle.is_some() {
            return;
        }

        let id = runtime.descriptor.id;
        let host = HostContext::new(self.triggers.clone());
        let worker = Arc::clone(&runtime.worker);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| worker.start(&host)))
            .unwrap_or_else(|panic| Err(Error::start_failure(id, panic_message(panic.as_ref()))));

        match result {
            Ok(handle) => {
                info!("Started feature {}", id);
                runtime.handle = Some(handle);
                report.started.push(id);
            }
            Err(e) => {
                error!("Feature {} failed to start, leaving it stopped: {}", id, e);
                report.failed.push(id);
            }
        }
    }

    async fn stop_feature(&self, runtime: &mut FeatureRuntime, report: &mut EvaluationReport) {
        let Some(handle) = runtime.handle.take() else {
            return;
        };

        let id = runtime.descriptor.id;
        info!("Stopping feature {}", id);
        if let Err(e) = handle.stop(self.stop_timeout).await {
            warn!("{}, releasing it anyway", e);
        }
        report.stopped.push(id);
    }

    async fn hide_presence(&self, state: &mut OrchestratorState) {
        if state.presence_shown {
            self.presence.hide().await;
            state.presence_shown = false;
        }
    }

    /// Stop everything and stop listening. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.pending_shutdowns.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if state.lifecycle != Lifecycle::ShutDown {
            info!("Shutting down orchestrator");
        }
        self.signals.unsubscribe();

        let mut report = EvaluationReport::default();
        for runtime in state.features.values_mut() {
            self.stop_feature(runtime, &mut report).await;
        }
        self.hide_presence(&mut state).await;
        state.lifecycle = Lifecycle::ShutDown;

        self.pending_shutdowns.fetch_sub(1, Ordering::SeqCst);
        if !report.stopped.is_empty() {
            info!("Stopped {} feature(s) on shutdown", report.stopped.len());
        }
    }

    /// Current state, read under the lock.
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            lifecycle: state.lifecycle,
            connection: state.connection,
            features: state
                .features
                .values()
                .map(|f| FeatureStatus {
                    id: f.descriptor.id,
                    state: f.state(),
                    started_at: f.handle.as_ref().map(WorkerHandle::started_at),
                })
                .collect(),
            presence_shown: state.presence_shown,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Drains triggers and turns them into passes.
pub struct TriggerLoop {
    rx: mpsc::UnboundedReceiver<Trigger>,
}

impl TriggerLoop {
    /// Run until the task is aborted.
    ///
    /// Triggers queued while a pass runs are folded into the next pass.
    /// A batch made only of worker exits reaps without restarting.
    pub async fn run(mut self, orchestrator: Arc<Orchestrator>) {
        while let Some(first) = self.rx.recv().await {
            let mut needs_evaluation = !matches!(first, Trigger::WorkerExited(_));
            while let Ok(next) = self.rx.try_recv() {
                needs_evaluation |= !matches!(next, Trigger::WorkerExited(_));
            }

            let outcome = if needs_evaluation {
                orchestrator.evaluate().await
            } else {
                orchestrator.reap().await
            };

            match outcome {
                Ok(report) if !report.is_unchanged() => debug!("Pass finished: {:?}", report),
                Ok(_) => {}
                Err(e) => debug!("{}", e),
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn recv(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Trigger> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureState, Vendor, ENABLED_MAPS, ENABLED_NOTIFICATIONS};
    use crate::services::testing::{Harness, WorkerMode};

    fn connect(h: &Harness, vendor: &str) {
        h.head_unit.update(true, Some(vendor.to_string()));
        h.security.set_connected(true);
    }

    fn enable_notifications(h: &Harness) {
        h.settings.set(ENABLED_NOTIFICATIONS, true);
        h.notifications_permission.set(true);
    }

    fn enable_maps(h: &Harness) {
        h.settings.set(ENABLED_MAPS, true);
        h.maps_permission.set(true);
    }

    #[tokio::test]
    async fn test_disconnected_starts_nothing() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        h.head_unit.set_connected(false);
        h.security.set_connected(false);

        let report = h.orchestrator.start().await.unwrap();

        assert!(report.started.is_empty());
        assert_eq!(h.notifications.starts(), 0);
        assert_eq!(h.maps.starts(), 0);
        assert!(!h.presence.is_shown());
        assert!(!h.orchestrator.status().await.presence_shown);
    }

    #[tokio::test]
    async fn test_connected_starts_enabled_feature_only() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        h.maps_permission.set(true);
        connect(&h, "mini");

        let report = h.orchestrator.start().await.unwrap();

        assert_eq!(report.started, vec![FeatureId::Notifications]);
        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.maps.starts(), 0);
        assert!(h.presence.is_shown());
        assert_eq!(
            h.presence.last_content(),
            Some(PresenceContent::for_vendor(Vendor::Mini))
        );

        let status = h.orchestrator.status().await;
        assert_eq!(status.feature_state(FeatureId::Notifications), Some(FeatureState::Running));
        assert_eq!(status.feature_state(FeatureId::Maps), Some(FeatureState::Stopped));
        assert!(status.presence_shown);
        assert_eq!(h.host.terminations(), 0);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_losing_a_channel_stops_everything() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();
        assert!(h.presence.is_shown());

        h.security.set_connected(false);
        let report = h.orchestrator.evaluate().await.unwrap();

        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        assert_eq!(h.notifications.stops(), 1);
        assert!(!h.presence.is_shown());
        assert_eq!(h.host.terminations(), 1);
        assert!(!h.orchestrator.status().await.presence_shown);
    }

    #[tokio::test]
    async fn test_revoked_permission_stops_only_that_feature() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();
        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.maps.starts(), 1);

        h.notifications_permission.set(false);
        let report = h.orchestrator.evaluate().await.unwrap();

        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        assert_eq!(h.notifications.stops(), 1);
        assert_eq!(h.maps.starts(), 1);
        assert_eq!(h.maps.stops(), 0);
        assert!(h.presence.is_shown());

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeated_evaluation_is_idempotent() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        let first = h.orchestrator.evaluate().await.unwrap();
        let second = h.orchestrator.evaluate().await.unwrap();

        assert!(first.is_unchanged());
        assert!(second.is_unchanged());
        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.maps.starts(), 1);
        assert_eq!(h.notifications.stops(), 0);
        assert_eq!(h.maps.stops(), 0);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_toggling_one_setting_leaves_the_other_feature_alone() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        for enabled in [false, true, false, true] {
            h.settings.set(ENABLED_MAPS, enabled);
            h.orchestrator.evaluate().await.unwrap();
        }

        assert_eq!(h.maps.starts(), 3);
        assert_eq!(h.maps.stops(), 2);
        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.notifications.stops(), 0);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_enabled_requests_termination() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        connect(&h, "bmw");

        let report = h.orchestrator.start().await.unwrap();

        assert!(!report.any_running);
        assert!(!h.presence.is_shown());
        assert_eq!(h.host.terminations(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_is_contained() {
        let h = Harness::new(WorkerMode::FailStart, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");

        let report = h.orchestrator.start().await.unwrap();

        assert_eq!(report.failed, vec![FeatureId::Notifications]);
        assert_eq!(report.started, vec![FeatureId::Maps]);
        let status = h.orchestrator.status().await;
        assert_eq!(status.feature_state(FeatureId::Notifications), Some(FeatureState::Stopped));
        assert_eq!(status.feature_state(FeatureId::Maps), Some(FeatureState::Running));

        // Retried on the next trigger, not before.
        assert_eq!(h.notifications.starts(), 1);
        h.orchestrator.evaluate().await.unwrap();
        assert_eq!(h.notifications.starts(), 2);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_panic_is_contained() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::PanicStart);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");

        let report = h.orchestrator.start().await.unwrap();

        assert_eq!(report.started, vec![FeatureId::Notifications]);
        assert_eq!(report.failed, vec![FeatureId::Maps]);
        assert!(h.presence.is_shown());

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_timeout_still_marks_stopped() {
        let h = Harness::with_stop_timeout(
            WorkerMode::SlowStop(Duration::from_secs(1)),
            WorkerMode::Idle,
            Duration::from_millis(100),
        );
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        h.settings.set(ENABLED_NOTIFICATIONS, false);
        let report = h.orchestrator.evaluate().await.unwrap();

        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        let status = h.orchestrator.status().await;
        assert_eq!(status.feature_state(FeatureId::Notifications), Some(FeatureState::Stopped));
        assert!(!status.presence_shown);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_and_blocks_later_passes() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        h.orchestrator.shutdown().await;
        h.orchestrator.shutdown().await;

        let status = h.orchestrator.status().await;
        assert_eq!(status.lifecycle, Lifecycle::ShutDown);
        assert!(status.features.iter().all(|f| f.state == FeatureState::Stopped));
        assert!(!status.presence_shown);
        assert!(!h.presence.is_shown());
        assert_eq!(h.notifications.stops(), 1);
        assert_eq!(h.maps.stops(), 1);

        assert!(matches!(
            h.orchestrator.evaluate().await,
            Err(Error::ConcurrentShutdownRace)
        ));
        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.maps.starts(), 1);

        // Unsubscribed: edges no longer queue triggers.
        let mut triggers = h.take_triggers();
        while triggers.try_recv().is_some() {}
        h.head_unit.set_connected(false);
        assert_eq!(triggers.try_recv(), None);
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_queued_evaluation() {
        let h = Harness::with_stop_timeout(
            WorkerMode::SlowStop(Duration::from_millis(200)),
            WorkerMode::Idle,
            Duration::from_secs(2),
        );
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        // A pass that holds the lock while the slow worker stops.
        h.settings.set(ENABLED_NOTIFICATIONS, false);
        let first = tokio::spawn({
            let orchestrator = Arc::clone(&h.orchestrator);
            async move { orchestrator.evaluate().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let shutdown = tokio::spawn({
            let orchestrator = Arc::clone(&h.orchestrator);
            async move { orchestrator.shutdown().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        h.settings.set(ENABLED_NOTIFICATIONS, true);
        let queued = h.orchestrator.evaluate().await;
        assert!(matches!(queued, Err(Error::ConcurrentShutdownRace)));

        first.await.unwrap().unwrap();
        shutdown.await.unwrap();

        assert_eq!(h.notifications.starts(), 1);
        assert_eq!(h.orchestrator.status().await.lifecycle, Lifecycle::ShutDown);
    }

    #[tokio::test]
    async fn test_running_implies_connected_for_any_edge_sequence() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        enable_maps(&h);
        h.orchestrator.start().await.unwrap();

        let edges = [
            (true, false),
            (true, true),
            (false, true),
            (true, true),
            (true, false),
            (false, false),
            (true, true),
            (false, true),
        ];
        for (head_unit, security) in edges {
            h.head_unit.set_connected(head_unit);
            h.security.set_connected(security);
            let report = h.orchestrator.evaluate().await.unwrap();

            let status = h.orchestrator.status().await;
            let any_running = status
                .features
                .iter()
                .any(|f| f.state == FeatureState::Running);
            assert_eq!(any_running, report.any_running);
            if any_running {
                assert!(head_unit && security);
            }
            assert_eq!(status.presence_shown, any_running);
            assert_eq!(h.presence.is_shown(), any_running);
        }

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_worker_is_reaped_without_restart() {
        let h = Harness::new(WorkerMode::ExitAfterCreate, WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        let mut triggers = h.take_triggers();
        let trigger = loop {
            match tokio::time::timeout(Duration::from_secs(2), triggers.recv()).await {
                Ok(Some(Trigger::WorkerExited(id))) => break id,
                Ok(Some(_)) => continue,
                other => panic!("no exit trigger: {:?}", other),
            }
        };
        assert_eq!(trigger, FeatureId::Notifications);

        let report = h.orchestrator.reap().await.unwrap();
        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        assert!(!report.any_running);
        assert_eq!(h.notifications.starts(), 1);
        assert!(!h.presence.is_shown());
        assert_eq!(h.host.terminations(), 1);

        // The next ordinary pass restarts it.
        h.orchestrator.evaluate().await.unwrap();
        assert_eq!(h.notifications.starts(), 2);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_trigger_loop_evaluates_on_signal_edges() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        h.orchestrator.start().await.unwrap();

        let triggers = h.take_triggers();
        let task = tokio::spawn(triggers.run(Arc::clone(&h.orchestrator)));

        connect(&h, "bmw");
        let mut running = false;
        for _ in 0..100 {
            let status = h.orchestrator.status().await;
            if status.feature_state(FeatureId::Notifications) == Some(FeatureState::Running) {
                running = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(running);

        h.orchestrator.shutdown().await;
        task.abort();
    }

    #[tokio::test]
    async fn test_settings_reloaded_only_while_connected() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        h.orchestrator.start().await.unwrap();
        assert_eq!(h.settings.reloads(), 0);

        connect(&h, "bmw");
        h.orchestrator.evaluate().await.unwrap();
        h.orchestrator.evaluate().await.unwrap();
        assert_eq!(h.settings.reloads(), 2);
    }

    #[tokio::test]
    async fn test_evaluate_before_start_is_a_no_op() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "bmw");

        let report = h.orchestrator.evaluate().await.unwrap();
        assert!(report.is_unchanged());
        assert_eq!(h.notifications.starts(), 0);
        assert_eq!(h.orchestrator.status().await.lifecycle, Lifecycle::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_maps(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();
        h.orchestrator.shutdown().await;

        let report = h.orchestrator.start().await.unwrap();
        assert_eq!(report.started, vec![FeatureId::Maps]);
        assert_eq!(h.maps.starts(), 2);

        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_worker_reaped_on_disconnect_requests_termination() {
        let h = Harness::new(WorkerMode::ExitAfterCreate, WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        let mut triggers = h.take_triggers();
        loop {
            match tokio::time::timeout(Duration::from_secs(2), triggers.recv()).await {
                Ok(Some(Trigger::WorkerExited(FeatureId::Notifications))) => break,
                Ok(Some(_)) => continue,
                other => panic!("no exit trigger: {:?}", other),
            }
        }

        h.head_unit.set_connected(false);
        let report = h.orchestrator.evaluate().await.unwrap();

        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        assert!(!report.any_running);
        assert!(!h.presence.is_shown());
        assert_eq!(h.host.terminations(), 1);
    }

    #[tokio::test]
    async fn test_lost_channel_stops_running_features() {
        let h = Harness::new(WorkerMode::Idle, WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "mini");
        h.orchestrator.start().await.unwrap();
        assert!(h.presence.is_shown());

        h.security.mark_unavailable();
        let report = h.orchestrator.evaluate().await.unwrap();

        assert_eq!(report.stopped, vec![FeatureId::Notifications]);
        assert_eq!(h.notifications.stops(), 1);
        assert!(!h.presence.is_shown());
        assert_eq!(h.host.terminations(), 1);

        let status = h.orchestrator.status().await;
        assert!(status.connection.head_unit);
        assert!(!status.connection.security);
        assert_eq!(status.feature_state(FeatureId::Notifications), Some(FeatureState::Stopped));
    }

    #[tokio::test]
    async fn test_start_queued_behind_shutdowns_is_abandoned() {
        let h = Harness::new(WorkerMode::SlowStop(Duration::from_millis(300)), WorkerMode::Idle);
        enable_notifications(&h);
        connect(&h, "bmw");
        h.orchestrator.start().await.unwrap();

        let orchestrator = Arc::clone(&h.orchestrator);
        let first = tokio::spawn(async move { orchestrator.shutdown().await });
        for _ in 0..100 {
            if h.orchestrator.state.try_lock().is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.orchestrator.state.try_lock().is_err());

        // The lock is fair: start queues behind the first shutdown and
        // ahead of the second.
        let orchestrator = Arc::clone(&h.orchestrator);
        let starting = tokio::spawn(async move { orchestrator.start().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let orchestrator = Arc::clone(&h.orchestrator);
        let second = tokio::spawn(async move { orchestrator.shutdown().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = starting.await.unwrap();
        assert!(matches!(result, Err(Error::ConcurrentShutdownRace)));
        first.await.unwrap();
        second.await.unwrap();

        let status = h.orchestrator.status().await;
        assert_eq!(status.lifecycle, Lifecycle::ShutDown);
        assert_eq!(status.feature_state(FeatureId::Notifications), Some(FeatureState::Stopped));
        assert_eq!(h.notifications.starts(), 1);
        assert!(!h.presence.is_shown());
    }
}
