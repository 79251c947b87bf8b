use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent_client::AgentApi;
use crate::alerts::AlertNotifier;
use crate::config::ShellConfig;
use crate::error::SupervisorError;
use crate::preferences::Preferences;
use crate::progress::{ProgressReporter, READINESS_RANGE};
use crate::readiness::{ReadinessProbe, ReadinessResult};
use crate::supervisor::{AgentLauncher, ProcessSupervisor};
use crate::surface::ShellSurface;
use crate::types::{AgentState, AgentStatusView, UpdateCheckOutcome};
use crate::update::{UpdateCoordinator, UpdateSource};

const MAIN_WINDOW_PERCENT: u8 = 96;

/// Bootstrap step currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootPhase {
    Idle,
    ShowSplash,
    StartAgent,
    ProbeReadiness,
    CheckUpdate,
    RevealMainWindow,
    StartAlertNotifier,
    CloseSplash,
    Done,
}

/// What bootstrap observed, mostly for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct BootReport {
    pub agent: AgentState,
    pub readiness: ReadinessResult,
    pub update: UpdateCheckOutcome,
}

/// Collaborators the orchestrator is built from.
pub struct Components {
    pub api: Arc<dyn AgentApi>,
    pub surface: Arc<dyn ShellSurface>,
    pub launcher: Arc<dyn AgentLauncher>,
    pub preferences: Arc<Preferences>,
    pub update_source: Option<Arc<dyn UpdateSource>>,
    pub agent_path: PathBuf,
    pub packaged: bool,
    pub version: String,
}

/// Owns every shell component for the lifetime of the app.
pub struct Orchestrator {
    config: ShellConfig,
    api: Arc<dyn AgentApi>,
    surface: Arc<dyn ShellSurface>,
    preferences: Arc<Preferences>,
    supervisor: ProcessSupervisor,
    probe: ReadinessProbe,
    updates: UpdateCoordinator,
    alerts: Arc<AlertNotifier>,
    progress: Arc<ProgressReporter>,
    phase: Mutex<BootPhase>,
    ui_ready: AtomicBool,
    shut_down: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: ShellConfig, components: Components) -> Self {
        let Components {
            api,
            surface,
            launcher,
            preferences,
            update_source,
            agent_path,
            packaged,
            version,
        } = components;

        let supervisor = ProcessSupervisor::new(launcher, agent_path, config.agent_args());
        let probe = ReadinessProbe::new(
            config.readiness_budget,
            config.attempt_timeout,
            config.retry_delay,
        );
        let updates = UpdateCoordinator::new(update_source, packaged, config.update_timeout);
        let alerts = Arc::new(AlertNotifier::new(
            Arc::clone(&api),
            Arc::clone(&surface),
            Arc::clone(&preferences),
            config.alert_cache_capacity,
            config.alert_interval,
            config.alert_request_timeout,
        ));
        let progress = Arc::new(ProgressReporter::new(Arc::clone(&surface), version));

        Self {
            config,
            api,
            surface,
            preferences,
            supervisor,
            probe,
            updates,
            alerts,
            progress,
            phase: Mutex::new(BootPhase::Idle),
            ui_ready: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn api(&self) -> &dyn AgentApi {
        self.api.as_ref()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn updates(&self) -> &UpdateCoordinator {
        &self.updates
    }

    pub fn alerts(&self) -> &Arc<AlertNotifier> {
        &self.alerts
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn phase(&self) -> BootPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: BootPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        info!(?phase, "bootstrap phase");
    }

    /// Runs the startup sequence once. Every step runs even if an earlier one failed.
    pub async fn bootstrap(&self) -> BootReport {
        let session = Uuid::new_v4();
        self.run_bootstrap()
            .instrument(info_span!("bootstrap", %session))
            .await
    }

    async fn run_bootstrap(&self) -> BootReport {
        self.enter(BootPhase::ShowSplash);
        self.surface.show_splash();
        self.progress.report(0, "Starting...");

        self.enter(BootPhase::StartAgent);
        self.progress.report(5, "Starting agent...");
        let agent = match self.supervisor.start() {
            Ok(state) => state,
            Err(e) => {
                warn!("agent start skipped: {}", e);
                self.supervisor.state()
            }
        };
        self.progress.report(10, "Connecting to agent...");

        self.enter(BootPhase::ProbeReadiness);
        let progress = Arc::clone(&self.progress);
        let readiness = self
            .probe
            .probe(self.api.as_ref(), |percent| {
                progress.report(percent, "Connecting to agent...")
            })
            .await;
        self.progress
            .report(READINESS_RANGE.end, readiness_label(agent, &readiness));

        self.enter(BootPhase::CheckUpdate);
        let progress = Arc::clone(&self.progress);
        let update = self
            .updates
            .run(move |step| {
                progress.report(step.percent, step.label);
                progress.download(step.download);
            })
            .await;
        self.progress.download(None);
        if self.ui_ready.load(Ordering::SeqCst) {
            self.announce_update();
        }

        self.enter(BootPhase::RevealMainWindow);
        self.progress.report(MAIN_WINDOW_PERCENT, "Opening dashboard...");
        self.surface.reveal_main();

        self.enter(BootPhase::StartAlertNotifier);
        if self.shut_down.load(Ordering::SeqCst) {
            info!("shutdown requested, alert notifier not started");
        } else {
            self.alerts.start();
        }

        self.enter(BootPhase::CloseSplash);
        self.progress.report(100, "Ready");
        self.surface.close_splash();

        self.enter(BootPhase::Done);
        info!(?agent, ready = readiness.ready, has_update = update.has_update, "bootstrap complete");
        BootReport {
            agent,
            readiness,
            update,
        }
    }

    /// The main UI is listening. Announces a downloaded update at most once per session.
    pub fn main_ui_ready(&self) -> Option<String> {
        self.ui_ready.store(true, Ordering::SeqCst);
        self.announce_update()
    }

    fn announce_update(&self) -> Option<String> {
        let version = self.updates.take_pending()?;
        info!(%version, "announcing downloaded update");
        self.surface.update_ready(&version);
        Some(version)
    }

    pub fn focus_main(&self) {
        self.surface.focus_main();
    }

    pub fn restart_agent(&self) -> Result<AgentState, SupervisorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Ok(self.supervisor.state());
        }
        self.supervisor.restart()
    }

    pub async fn agent_status(&self) -> AgentStatusView {
        let process = self.supervisor.snapshot();
        match self.api.status(self.config.alert_request_timeout).await {
            Ok(status) => AgentStatusView {
                connected: true,
                process,
                status: Some(status),
                error: None,
            },
            Err(e) => AgentStatusView {
                connected: false,
                process,
                status: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Stops alerts, then the agent. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down");
        self.alerts.stop();
        self.supervisor.stop();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

fn readiness_label(agent: AgentState, readiness: &ReadinessResult) -> &'static str {
    if readiness.ready {
        "Agent connected"
    } else if matches!(agent, AgentState::NotStarted | AgentState::Failed) {
        "Agent not detected"
    } else {
        "Agent not responding"
    }
}
