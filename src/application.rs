//! Daemon root object and lifecycle wiring.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};
use zbus::Connection;

use crate::bus::{self, BridgeCommand, BridgeInterface};
use crate::connectivity::{ConnectivitySignals, SignalChannel};
use crate::features::{CarLink, LogLink, MapsWorker, NotificationFeed, NotificationsWorker};
use crate::models::{AppConfig, FeatureDescriptor, FeatureId, Result};
use crate::permissions::{GrantFile, Permission};
use crate::presence::{DesktopPresence, LogPresence, PresenceIndicator};
use crate::services::{Collaborators, FeatureWorker, HostLifecycle, Orchestrator};
use crate::storage::DataStore;
use crate::{APP_NAME, VERSION};

/// Host side of self-termination: the orchestrator asks, the run loop decides.
#[derive(Debug, Default)]
pub struct DaemonHost {
    requested: Notify,
}

impl DaemonHost {
    async fn terminate_requested(&self) {
        self.requested.notified().await;
    }
}

impl HostLifecycle for DaemonHost {
    fn request_self_terminate(&self) {
        debug!("Self-termination requested");
        self.requested.notify_one();
    }
}

/// The bridge daemon.
pub struct Application {
    store: Arc<DataStore>,
}

impl Application {
    pub fn new(store: Arc<DataStore>) -> Self {
        Self { store }
    }

    /// Run until a termination signal arrives, or until idle when
    /// `exit_when_idle` is set.
    pub async fn run(self) -> Result<()> {
        info!("{} {} starting up", APP_NAME, VERSION);
        info!("Using configuration in {:?}", self.store.config_dir());
        if let Err(e) = self.store.ensure_settings_file() {
            warn!("Failed to write default settings: {}", e);
        }
        let config = self.store.settings();

        let head_unit = Arc::new(SignalChannel::new("head-unit"));
        let security = Arc::new(SignalChannel::new("security"));
        let feed = Arc::new(NotificationFeed::new());
        let link: Arc<dyn CarLink> = Arc::new(LogLink);

        let session = match bus::session_connection().await {
            Ok(connection) => Some(connection),
            Err(e) => {
                warn!("{}; running without a command surface", e);
                None
            }
        };

        let host = Arc::new(DaemonHost::default());
        let collaborators = Collaborators {
            signals: ConnectivitySignals::new(head_unit.clone(), security.clone()),
            settings: self.store.clone(),
            presence: presence_for(&config, session.as_ref()).await,
            host: host.clone(),
        };
        let features = self.features(&config, Arc::clone(&feed), link);
        let (orchestrator, triggers) =
            Orchestrator::new(collaborators, features, config.stop_timeout());
        let trigger_task = tokio::spawn(triggers.run(Arc::clone(&orchestrator)));

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        if let Some(connection) = session.as_ref() {
            let interface = BridgeInterface::new(
                command_tx.clone(),
                head_unit,
                security,
                feed,
                Arc::clone(&orchestrator),
            );
            if let Err(e) = bus::start_bus(connection, interface).await {
                error!("Failed to start D-Bus command surface: {}", e);
            }
        }

        if config.start_on_launch {
            let _ = command_tx.send(BridgeCommand::Start);
        }

        let mut sigterm = signal(SignalKind::terminate())?;
        loop {
            tokio::select! {
                Some(command) = command_rx.recv() => {
                    handle_command(&orchestrator, command).await;
                }
                _ = host.terminate_requested() => {
                    if self.store.settings().exit_when_idle {
                        info!("Nothing running, exiting");
                        break;
                    }
                    debug!("Idle, staying up");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Terminated, shutting down");
                    break;
                }
            }
        }

        orchestrator.shutdown().await;
        trigger_task.abort();
        info!("{} stopped", APP_NAME);
        Ok(())
    }

    /// Every feature, gated by its grant in the permissions file.
    fn features(
        &self,
        config: &AppConfig,
        feed: Arc<NotificationFeed>,
        link: Arc<dyn CarLink>,
    ) -> Vec<(FeatureDescriptor, Arc<dyn FeatureWorker>)> {
        let grants = self.store.permissions_file();
        let notifications: Arc<dyn FeatureWorker> =
            Arc::new(NotificationsWorker::new(feed, Arc::clone(&link)));
        let maps: Arc<dyn FeatureWorker> = Arc::new(MapsWorker::new(config.maps, link));
        vec![
            (
                FeatureDescriptor::new(
                    FeatureId::Notifications,
                    Arc::new(GrantFile::new(grants, Permission::NotificationListener)),
                ),
                notifications,
            ),
            (
                FeatureDescriptor::new(
                    FeatureId::Maps,
                    Arc::new(GrantFile::new(grants, Permission::Location)),
                ),
                maps,
            ),
        ]
    }
}

async fn presence_for(
    config: &AppConfig,
    session: Option<&Connection>,
) -> Arc<dyn PresenceIndicator> {
    if let (true, Some(connection)) = (config.presence, session) {
        match DesktopPresence::connect(connection).await {
            Ok(presence) => return Arc::new(presence),
            Err(e) => warn!("Desktop notifications unavailable: {}", e),
        }
    }
    Arc::new(LogPresence::default())
}

async fn handle_command(orchestrator: &Orchestrator, command: BridgeCommand) {
    debug!("Handling {:?}", command);
    match command {
        BridgeCommand::Start => match orchestrator.start().await {
            Ok(report) => info!(
                "Orchestrator started, {} feature(s) running",
                report.started.len()
            ),
            Err(e) => warn!("Start interrupted: {}", e),
        },
        BridgeCommand::Stop => orchestrator.shutdown().await,
        BridgeCommand::ReloadSettings => orchestrator.request_evaluation(),
    }
}
