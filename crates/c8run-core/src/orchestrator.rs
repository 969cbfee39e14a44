use crate::capabilities::PlatformCapabilities;
use crate::config::{BrowserConfig, LaunchConfig, TerminationConfig};
use crate::error::C8RunError;
use crate::java;
use crate::probe::ReadinessProbes;
use crate::process::{CommandSpec, ComponentKind, ComponentStatus};
use crate::supervisor::{ProcessSupervisor, ReadinessGate};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of one launcher session
///
/// `Idle` is initial and `Stopped` is terminal. `Failed` is reached when a
/// start was rolled back; only `stop()` is accepted from there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum OrchestratorState {
    Idle,
    Starting,
    Running,
    /// At least one managed process exited while running
    Degraded { exited: Vec<ComponentKind> },
    Stopping,
    Stopped,
    Failed { reason: String },
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Stopped)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Idle => f.write_str("idle"),
            OrchestratorState::Starting => f.write_str("starting"),
            OrchestratorState::Running => f.write_str("running"),
            OrchestratorState::Degraded { exited } => {
                let names: Vec<_> = exited.iter().map(ComponentKind::name).collect();
                write!(f, "degraded ({} exited)", names.join(", "))
            }
            OrchestratorState::Stopping => f.write_str("stopping"),
            OrchestratorState::Stopped => f.write_str("stopped"),
            OrchestratorState::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// Result of [`Orchestrator::status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub state: OrchestratorState,
    pub components: Vec<ComponentStatus>,
}

impl StatusReport {
    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.kind == kind)
    }
}

/// Sequences the search engine, connector runtime and main runtime
///
/// All process records live in the supervisor; the orchestrator only keeps
/// the session state and passes handles back and forth.
pub struct Orchestrator<P: PlatformCapabilities> {
    platform: Arc<P>,
    supervisor: ProcessSupervisor<P>,
    state: Mutex<OrchestratorState>,
    termination: Mutex<TerminationConfig>,
    cancel: CancellationToken,
}

impl<P: PlatformCapabilities> Orchestrator<P> {
    pub fn new(platform: Arc<P>) -> Self {
        info!(platform = platform.platform_name(), "Creating orchestrator");
        Self {
            supervisor: ProcessSupervisor::new(platform.clone()),
            platform,
            state: Mutex::new(OrchestratorState::Idle),
            termination: Mutex::new(TerminationConfig::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state without refreshing process status
    pub fn state(&self) -> OrchestratorState {
        self.lock_state().clone()
    }

    fn transition(&self, from: &OrchestratorState, to: OrchestratorState) -> bool {
        let mut state = self.lock_state();
        if *state != *from {
            return false;
        }
        info!(from = %state, to = %to, "State transition");
        *state = to;
        true
    }

    /// Launch every configured component in order, gating each on readiness
    ///
    /// On failure every process started so far is terminated before the error
    /// is returned.
    pub async fn start(
        &self,
        config: &LaunchConfig,
        probes: ReadinessProbes,
    ) -> Result<(), C8RunError> {
        {
            let mut state = self.lock_state();
            if *state != OrchestratorState::Idle {
                return Err(C8RunError::StateConflict {
                    state: state.clone(),
                    operation: "start",
                });
            }
            // A rejected config leaves the state Idle
            config.validate()?;
            info!(from = %state, to = %OrchestratorState::Starting, "State transition");
            *state = OrchestratorState::Starting;
        }
        *self
            .termination
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = config.termination.clone();

        match self.launch_all(config, &probes).await {
            Ok(()) => {
                if !self.transition(&OrchestratorState::Starting, OrchestratorState::Running) {
                    return Err(C8RunError::Cancelled);
                }
                info!("All components are ready");
                if config.browser.open {
                    self.open_browser(&config.browser).await;
                }
                Ok(())
            }
            Err(C8RunError::Cancelled) if self.cancel.is_cancelled() => {
                info!("Startup interrupted by stop");
                Err(C8RunError::Cancelled)
            }
            Err(e) => {
                error!(error = %e, "Startup failed, rolling back started components");
                if let Err(rollback) = self.supervisor.terminate_all(&config.termination).await {
                    warn!(error = %rollback, "Rollback left processes behind");
                }
                self.transition(
                    &OrchestratorState::Starting,
                    OrchestratorState::Failed {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn launch_all(
        &self,
        config: &LaunchConfig,
        probes: &ReadinessProbes,
    ) -> Result<(), C8RunError> {
        let java_binary = java::resolve_java_binary(config.java_home.as_deref())?;
        if config.check_java_version {
            self.check_java(&java_binary).await?;
        }

        for kind in config.components() {
            if self.cancel.is_cancelled() {
                return Err(C8RunError::Cancelled);
            }
            let spec = self.build_command(kind, config, &java_binary)?;
            let handle = self.supervisor.launch(kind, spec)?;
            let gate = ReadinessGate {
                timeout: config.readiness.timeout_for(kind),
                poll_interval: config.readiness.poll_interval(),
            };
            self.supervisor
                .wait_ready(handle, probes.for_kind(kind).as_ref(), gate, &self.cancel)
                .await?;
        }

        self.supervisor.mark_running();
        Ok(())
    }

    async fn check_java(&self, java_binary: &Path) -> Result<(), C8RunError> {
        let spec = self.platform.version_cmd(java_binary)?;
        let output = self
            .supervisor
            .run_to_completion(spec, VERSION_CHECK_TIMEOUT)
            .await?;
        // `java --version` prints to stdout, older releases print to stderr
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let version = java::check_java_version(&text)?;
        info!(java = %java_binary.display(), version, "Java version accepted");
        Ok(())
    }

    fn build_command(
        &self,
        kind: ComponentKind,
        config: &LaunchConfig,
        java_binary: &Path,
    ) -> Result<CommandSpec, C8RunError> {
        let parent_dir = config.parent_dir.as_path();
        let spec = match kind {
            ComponentKind::SearchEngine => self
                .platform
                .elasticsearch_cmd(&config.elasticsearch_version, parent_dir)?,
            ComponentKind::ConnectorRuntime => {
                self.platform
                    .connectors_cmd(java_binary, parent_dir, &config.camunda_version)?
            }
            ComponentKind::MainRuntime => {
                let mut args = Vec::new();
                if let Some(location) = &config.camunda_config {
                    args.push(format!(
                        "--spring.config.location={}",
                        parent_dir.join(location).display()
                    ));
                }
                args.extend(config.extra_args.iter().cloned());
                self.platform.camunda_cmd(
                    &config.camunda_version,
                    parent_dir,
                    &args,
                    config.java_opts.as_deref(),
                )?
            }
        };

        Ok(match (&config.java_home, kind) {
            (Some(home), ComponentKind::SearchEngine | ComponentKind::MainRuntime) => {
                spec.env("JAVA_HOME", home.display().to_string())
            }
            _ => spec,
        })
    }

    async fn open_browser(&self, browser: &BrowserConfig) {
        let result = match &browser.startup_url {
            Some(url) => self.platform.open_url(url).await,
            None => {
                self.platform
                    .open_browser(&browser.protocol, browser.port)
                    .await
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Could not open the browser, continuing without it");
        }
    }

    /// Terminate every managed process tree
    ///
    /// Safe to call at any point after `start` began, including while it is
    /// still waiting for a component. Termination failures are aggregated
    /// into a single error after every process was attempted.
    pub async fn stop(&self) -> Result<(), C8RunError> {
        {
            let mut state = self.lock_state();
            match &*state {
                OrchestratorState::Stopped => return Ok(()),
                OrchestratorState::Stopping => {
                    return Err(C8RunError::StateConflict {
                        state: state.clone(),
                        operation: "stop",
                    });
                }
                _ => {
                    info!(from = %state, to = %OrchestratorState::Stopping, "State transition");
                    *state = OrchestratorState::Stopping;
                }
            }
        }

        self.cancel.cancel();
        self.supervisor.close();
        let config = self
            .termination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let result = self.supervisor.terminate_all(&config).await;

        *self.lock_state() = OrchestratorState::Stopped;
        match &result {
            Ok(()) => info!("All components stopped"),
            Err(e) => error!(error = %e, "Stopped with termination failures"),
        }
        result.map_err(C8RunError::from)
    }

    /// Refresh process status and report the session state
    ///
    /// A process found exited while the session is running moves it to
    /// `Degraded`; nothing is restarted.
    pub fn status(&self) -> StatusReport {
        let components = self.supervisor.refresh();
        let mut state = self.lock_state();

        if matches!(
            *state,
            OrchestratorState::Running | OrchestratorState::Degraded { .. }
        ) {
            let exited: Vec<ComponentKind> = components
                .iter()
                .filter(|c| !c.status.is_live())
                .map(|c| c.kind)
                .collect();
            if !exited.is_empty() {
                let degraded = OrchestratorState::Degraded { exited };
                if *state != degraded {
                    warn!(from = %state, to = %degraded, "State transition");
                    *state = degraded;
                }
            }
        }

        StatusReport {
            state: state.clone(),
            components,
        }
    }
}
