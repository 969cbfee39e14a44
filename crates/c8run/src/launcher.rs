use crate::factory::{NativePlatform, PlatformFactory};
use crate::http_probe::http_probes;
use c8run_core::{
    C8RunError, ComponentKind, LaunchConfig, Orchestrator, OrchestratorState, PlatformCapabilities,
    ReadinessProbes, StatusReport,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Why a foreground session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum RunOutcome {
    /// The shutdown future resolved
    ShutdownRequested,
    /// Managed processes exited on their own
    ComponentsExited { exited: Vec<ComponentKind> },
}

/// High-level launcher for one local deployment
pub struct C8Run<P: PlatformCapabilities = NativePlatform> {
    config: LaunchConfig,
    orchestrator: Orchestrator<P>,
    watch_interval: Duration,
}

impl C8Run<NativePlatform> {
    /// Create a launcher on the provider of the current target
    pub fn new(config: LaunchConfig) -> Self {
        Self::with_platform(config, Arc::new(PlatformFactory::create_platform()))
    }
}

impl<P: PlatformCapabilities> C8Run<P> {
    pub fn with_platform(config: LaunchConfig, platform: Arc<P>) -> Self {
        Self {
            config,
            orchestrator: Orchestrator::new(platform),
            watch_interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    /// How often `run_until` checks for exited components
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Start every component, gated on its HTTP health endpoint
    pub async fn start(&self) -> Result<(), C8RunError> {
        let probes = http_probes(&self.config.readiness)?;
        self.start_with_probes(probes).await
    }

    pub async fn start_with_probes(&self, probes: ReadinessProbes) -> Result<(), C8RunError> {
        self.orchestrator.start(&self.config, probes).await
    }

    pub async fn stop(&self) -> Result<(), C8RunError> {
        self.orchestrator.stop().await
    }

    pub fn status(&self) -> StatusReport {
        self.orchestrator.status()
    }

    pub fn state(&self) -> OrchestratorState {
        self.orchestrator.state()
    }

    /// Run a foreground session with HTTP readiness probes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunOutcome, C8RunError>
    where
        F: Future<Output = ()>,
    {
        let probes = http_probes(&self.config.readiness)?;
        self.run_until_with_probes(probes, shutdown).await
    }

    /// Start, watch until `shutdown` resolves or a component exits, then stop
    ///
    /// A shutdown during startup stops the session while the start is still
    /// polled, so a rollback already under way runs to completion. A failed
    /// start is returned as is after the session was stopped. When both the
    /// session and the stop fail, the stop error is returned.
    pub async fn run_until_with_probes<F>(
        &self,
        probes: ReadinessProbes,
        shutdown: F,
    ) -> Result<RunOutcome, C8RunError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let start = self.start_with_probes(probes);
        tokio::pin!(start);

        let (outcome, stopped) = tokio::select! {
            result = &mut start => {
                let outcome = match result {
                    Ok(()) => {
                        info!(watch_interval = ?self.watch_interval, "Deployment is running");
                        Ok(self.watch(&mut shutdown).await)
                    }
                    Err(e) => Err(e),
                };
                (outcome, self.stop().await)
            }
            _ = &mut shutdown => {
                info!("Shutdown requested during startup");
                let (result, stopped) = tokio::join!(&mut start, self.stop());
                let outcome = match result {
                    Ok(()) | Err(C8RunError::Cancelled) => Ok(RunOutcome::ShutdownRequested),
                    Err(e) => Err(e),
                };
                (outcome, stopped)
            }
        };

        match (outcome, stopped) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(start), Err(stop)) => {
                warn!(error = %start, "Session failed before stop also failed");
                Err(stop)
            }
        }
    }

    async fn watch<F>(&self, shutdown: &mut std::pin::Pin<&mut F>) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.watch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.as_mut() => {
                    info!("Shutdown requested");
                    return RunOutcome::ShutdownRequested;
                }
                _ = ticker.tick() => {
                    if let OrchestratorState::Degraded { exited } = self.status().state {
                        warn!(exited = ?exited, "Components exited, shutting down the session");
                        return RunOutcome::ComponentsExited { exited };
                    }
                }
            }
        }
    }
}
