// Head Unit Bridge - Feature Worker Contexts
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Dedicated execution contexts for features.
//!
//! Every running feature owns one OS thread driving its own
//! single-threaded runtime, so blocking work in one feature cannot
//! starve another. The orchestrator talks to a context only through
//! its [`WorkerHandle`]: a stop request and an acknowledgment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::orchestrator::{Trigger, TriggerSender};
use crate::models::{Error, FeatureId, Result};

/// Feature logic running inside a worker context.
#[async_trait]
pub trait FeatureApp: Send + 'static {
    /// Feature-specific setup, run on the context once it is up.
    async fn on_create(&mut self) -> Result<()>;

    /// Wait for and handle the next unit of work.
    ///
    /// Must be cancel-safe: it is raced against the stop request.
    async fn step(&mut self) -> Result<()>;

    /// Release every feature-owned resource. Also called after a failed
    /// or interrupted `on_create`.
    async fn on_destroy(&mut self);
}

/// What the orchestrator hands a feature when starting it.
#[derive(Clone)]
pub struct HostContext {
    triggers: TriggerSender,
}

impl HostContext {
    pub(crate) fn new(triggers: TriggerSender) -> Self {
        Self { triggers }
    }
}

/// Starts a feature's worker context.
pub trait FeatureWorker: Send + Sync {
    /// Allocate the context and return once it exists. Initialization
    /// continues on the context after this returns.
    fn start(&self, host: &HostContext) -> Result<WorkerHandle>;
}

/// Owned handle to a running worker context.
pub struct WorkerHandle {
    feature: FeatureId,
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: oneshot::Receiver<()>,
    alive: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
}

/// Marks the context dead when its thread ends, however it ends.
struct ContextGuard {
    feature: FeatureId,
    alive: Arc<AtomicBool>,
    done_tx: Option<oneshot::Sender<()>>,
    triggers: TriggerSender,
    stop_requested: bool,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(done) = self.done_tx.take() {
            let _ = done.send(());
        }
        if !self.stop_requested {
            warn!("Feature {} context exited without a stop request", self.feature);
            let _ = self.triggers.send(Trigger::WorkerExited(self.feature));
        }
    }
}

impl WorkerHandle {
    /// Spawn a dedicated context running `app`.
    pub fn spawn(feature: FeatureId, host: &HostContext, app: Box<dyn FeatureApp>) -> Result<Self> {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));

        let thread_alive = Arc::clone(&alive);
        let triggers = host.triggers.clone();

        std::thread::Builder::new()
            .name(format!("feature-{}", feature))
            .spawn(move || {
                let mut guard = ContextGuard {
                    feature,
                    alive: thread_alive,
                    done_tx: Some(done_tx),
                    triggers,
                    stop_requested: false,
                };
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to build runtime for feature {}: {}", feature, e);
                        return;
                    }
                };
                guard.stop_requested = runtime.block_on(run_context(feature, app, stop_rx));
            })?;

        Ok(Self {
            feature,
            stop_tx: Some(stop_tx),
            done_rx,
            alive,
            started_at: Utc::now(),
        })
    }

    /// Whether the context is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Request termination and wait, up to `timeout`, for acknowledgment.
    ///
    /// On timeout the handle is released anyway; the context finishes on
    /// its own once it observes the request.
    pub async fn stop(mut self, timeout: Duration) -> Result<()> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        match tokio::time::timeout(timeout, &mut self.done_rx).await {
            // A dropped sender means the context is already gone.
            Ok(_) => Ok(()),
            Err(_) => Err(Error::FeatureStopTimeout {
                feature: self.feature,
                timeout,
            }),
        }
    }
}

/// Drive one context. Returns true when it ended because stop was requested.
async fn run_context(
    feature: FeatureId,
    mut app: Box<dyn FeatureApp>,
    mut stop_rx: oneshot::Receiver<()>,
) -> bool {
    debug!("Feature {} context up", feature);

    let created = tokio::select! {
        biased;
        _ = &mut stop_rx => {
            info!("Feature {} stopped during setup", feature);
            app.on_destroy().await;
            return true;
        }
        result = app.on_create() => result,
    };

    if let Err(e) = created {
        error!("Feature {} setup failed: {}", feature, e);
        app.on_destroy().await;
        return false;
    }

    info!("Feature {} running", feature);
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            result = app.step() => {
                if let Err(e) = result {
                    error!("Feature {} stopped processing: {}", feature, e);
                    app.on_destroy().await;
                    return false;
                }
            }
        }
    }

    app.on_destroy().await;
    debug!("Feature {} context finished", feature);
    true
}
