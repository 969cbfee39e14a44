use crate::capabilities::PlatformCapabilities;
use crate::config::TerminationConfig;
use crate::error::{C8RunError, TerminationError, TerminationFailure};
use crate::probe::ReadinessProbe;
use crate::process::{
    CommandSpec, ComponentKind, ComponentStatus, ProcessId, ProcessRef, ProcessStatus, ProcessTree,
};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::process::Child;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A process started and owned by the supervisor
pub struct ManagedProcess {
    kind: ComponentKind,
    pid: ProcessId,
    child: Child,
    command: String,
    started_at: SystemTime,
    status: ProcessStatus,
}

impl ManagedProcess {
    /// Reap the child if it has exited and report whether it is still alive
    ///
    /// A record already marked `Failed` keeps its status but still reports
    /// liveness, so an unkillable process is never replaced silently.
    fn poll_exit(&mut self) -> bool {
        if !self.status.is_live() {
            return matches!(self.child.try_wait(), Ok(None));
        }
        match self.child.try_wait() {
            Ok(Some(exit)) => {
                self.status = ProcessStatus::Exited { code: exit.code() };
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(component = %self.kind, pid = %self.pid, error = %e, "Failed to query process status");
                self.status = ProcessStatus::Failed {
                    reason: format!("status query failed: {e}"),
                };
                false
            }
        }
    }

    fn snapshot(&self) -> ComponentStatus {
        ComponentStatus {
            kind: self.kind,
            pid: self.pid,
            status: self.status.clone(),
            started_at: self.started_at,
        }
    }
}

/// Bounds for one readiness wait
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

enum ProbeOutcome {
    NotReady,
    Exited(ProcessStatus),
}

#[derive(Default)]
struct ProcessTable {
    processes: BTreeMap<ComponentKind, ManagedProcess>,
    closed: bool,
}

/// Starts commands, tracks the resulting processes and tears down their trees
///
/// The supervisor is the only writer of process records. Everything it hands
/// out is a [`ProcessRef`] that has to be passed back in.
pub struct ProcessSupervisor<P: PlatformCapabilities> {
    platform: Arc<P>,
    table: Mutex<ProcessTable>,
}

impl<P: PlatformCapabilities> ProcessSupervisor<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            table: Mutex::new(ProcessTable::default()),
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    fn table(&self) -> MutexGuard<'_, ProcessTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `spec` as the process of `kind`
    pub fn launch(&self, kind: ComponentKind, spec: CommandSpec) -> Result<ProcessRef, C8RunError> {
        let program = spec.program.clone();
        let command = spec.display_line();
        let mut cmd = spec.into_command();
        cmd.stdin(Stdio::null());
        self.platform.prepare_command(&mut cmd)?;

        let mut table = self.table();
        if table.closed {
            return Err(C8RunError::Cancelled);
        }
        if let Some(existing) = table.processes.get_mut(&kind) {
            if existing.poll_exit() {
                return Err(C8RunError::AlreadyRunning {
                    component: kind,
                    pid: existing.pid,
                });
            }
        }

        let child = cmd.spawn().map_err(|source| C8RunError::Launch {
            component: kind,
            program: program.clone(),
            source,
        })?;
        let pid = child.id().map(ProcessId).ok_or_else(|| C8RunError::Launch {
            component: kind,
            program,
            source: std::io::Error::other("process exited before its PID was read"),
        })?;

        info!(component = %kind, pid = %pid, command = %command, "Spawned process");
        table.processes.insert(
            kind,
            ManagedProcess {
                kind,
                pid,
                child,
                command,
                started_at: SystemTime::now(),
                status: ProcessStatus::Starting,
            },
        );
        Ok(ProcessRef { kind, pid })
    }

    /// Run a short-lived command to completion and capture its output
    pub async fn run_to_completion(
        &self,
        spec: CommandSpec,
        timeout: Duration,
    ) -> Result<Output, C8RunError> {
        let command = spec.display_line();
        let mut cmd = spec.into_command();
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        self.platform.prepare_command(&mut cmd)?;

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("{command} did not finish within {timeout:?}"))?
            .with_context(|| format!("Failed to run {command}"))?;
        debug!(command = %command, status = %output.status, "Command finished");
        Ok(output)
    }

    /// Poll `probe` until it succeeds, the process exits, or `gate.timeout` elapses
    pub async fn wait_ready(
        &self,
        handle: ProcessRef,
        probe: &dyn ReadinessProbe,
        gate: ReadinessGate,
        cancel: &CancellationToken,
    ) -> Result<(), C8RunError> {
        info!(
            component = %handle.kind,
            pid = %handle.pid,
            probe = %probe.describe(),
            timeout = ?gate.timeout,
            "Waiting for readiness"
        );

        let attempt = move || async move {
            if let Some(status) = self.poll_status(handle) {
                if !status.is_live() {
                    return Err(ProbeOutcome::Exited(status));
                }
            }
            if probe.is_ready().await {
                Ok(())
            } else {
                Err(ProbeOutcome::NotReady)
            }
        };

        let max_attempts = (gate.timeout.as_millis() / gate.poll_interval.as_millis().max(1))
            as usize
            + 1;
        let backoff = ConstantBuilder::default()
            .with_delay(gate.poll_interval)
            .with_max_times(max_attempts);
        let polling = attempt
            .retry(backoff)
            .when(|outcome: &ProbeOutcome| matches!(outcome, ProbeOutcome::NotReady));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(C8RunError::Cancelled),
            outcome = tokio::time::timeout(gate.timeout, polling) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                self.set_status(handle, ProcessStatus::Ready);
                info!(component = %handle.kind, pid = %handle.pid, "Component is ready");
                Ok(())
            }
            Ok(Err(ProbeOutcome::Exited(status))) => {
                warn!(component = %handle.kind, pid = %handle.pid, status = %status, "Process exited during startup");
                Err(C8RunError::ExitedDuringStartup {
                    component: handle.kind,
                    status: status.to_string(),
                })
            }
            Ok(Err(ProbeOutcome::NotReady)) | Err(_) => {
                warn!(component = %handle.kind, pid = %handle.pid, timeout = ?gate.timeout, "Readiness timed out");
                Err(C8RunError::Timeout {
                    component: handle.kind,
                    timeout: gate.timeout,
                })
            }
        }
    }

    fn poll_status(&self, handle: ProcessRef) -> Option<ProcessStatus> {
        let mut table = self.table();
        let record = table
            .processes
            .get_mut(&handle.kind)
            .filter(|r| r.pid == handle.pid)?;
        record.poll_exit();
        Some(record.status.clone())
    }

    fn set_status(&self, handle: ProcessRef, status: ProcessStatus) {
        let mut table = self.table();
        if let Some(record) = table
            .processes
            .get_mut(&handle.kind)
            .filter(|r| r.pid == handle.pid && r.status.is_live())
        {
            record.status = status;
        }
    }

    /// Promote every ready process to running
    pub fn mark_running(&self) {
        let mut table = self.table();
        for record in table.processes.values_mut() {
            if record.status == ProcessStatus::Ready {
                record.status = ProcessStatus::Running;
            }
        }
    }

    /// Reap exited processes and return the current view, in launch order
    pub fn refresh(&self) -> Vec<ComponentStatus> {
        let mut table = self.table();
        table
            .processes
            .values_mut()
            .map(|record| {
                let was_live = record.status.is_live();
                record.poll_exit();
                if was_live && !record.status.is_live() {
                    warn!(
                        component = %record.kind,
                        pid = %record.pid,
                        status = %record.status,
                        command = %record.command,
                        "Managed process exited unexpectedly"
                    );
                }
                record.snapshot()
            })
            .collect()
    }

    pub fn handles(&self) -> Vec<ProcessRef> {
        self.table()
            .processes
            .values()
            .map(|r| ProcessRef {
                kind: r.kind,
                pid: r.pid,
            })
            .collect()
    }

    /// Refuse any further launches
    pub fn close(&self) {
        self.table().closed = true;
    }

    /// Liveness of a tracked root, `None` once its record is gone
    fn poll_root(&self, handle: ProcessRef) -> Option<bool> {
        let mut table = self.table();
        let record = table
            .processes
            .get_mut(&handle.kind)
            .filter(|r| r.pid == handle.pid)?;
        Some(record.poll_exit())
    }

    /// Terminate a process and its whole tree, root last
    ///
    /// Terminating a process that already exited, or one that was already
    /// reaped, only sweeps whatever it left behind in its process group.
    /// The record stays in the table until the tree is gone, so an
    /// interrupted call leaves the process to the next `terminate` and to
    /// the emergency cleanup on drop.
    pub async fn terminate(
        &self,
        handle: ProcessRef,
        config: &TerminationConfig,
    ) -> Result<(), TerminationError> {
        let Some(root_alive) = self.poll_root(handle) else {
            debug!(component = %handle.kind, pid = %handle.pid, "Process already reaped");
            return Ok(());
        };

        let survivors = self.terminate_tree(handle, root_alive, config).await;

        let mut table = self.table();
        if survivors.is_empty() {
            let tracked = table
                .processes
                .get(&handle.kind)
                .is_some_and(|r| r.pid == handle.pid);
            if tracked {
                table.processes.remove(&handle.kind);
            }
            return Ok(());
        }

        let mut error = TerminationError::default();
        for pid in &survivors {
            error.push(TerminationFailure {
                component: handle.kind,
                pid: *pid,
                reason: "still running after forced kill".to_string(),
            });
        }
        if let Some(record) = table
            .processes
            .get_mut(&handle.kind)
            .filter(|r| r.pid == handle.pid)
        {
            record.status = ProcessStatus::Failed {
                reason: error.to_string(),
            };
        }
        Err(error)
    }

    /// Terminate every tracked process, most recently started first
    ///
    /// Failures are collected and the remaining processes are still attempted.
    pub async fn terminate_all(&self, config: &TerminationConfig) -> Result<(), TerminationError> {
        let mut handles = self.handles();
        handles.reverse();

        let mut errors = TerminationError::default();
        for handle in handles {
            if let Err(e) = self.terminate(handle, config).await {
                warn!(component = %handle.kind, pid = %handle.pid, error = %e, "Termination failed, continuing with remaining processes");
                errors.merge(e);
            }
        }
        errors.into_result()
    }

    /// Returns the pids that survived both the graceful and the forced pass
    async fn terminate_tree(
        &self,
        handle: ProcessRef,
        root_alive: bool,
        config: &TerminationConfig,
    ) -> Vec<ProcessId> {
        let tree: Vec<ProcessId> = if root_alive {
            self.platform
                .process_tree(handle.pid)
                .unwrap_or_else(|e| {
                    warn!(component = %handle.kind, pid = %handle.pid, error = %e, "Process tree unavailable, terminating root only");
                    ProcessTree::root_only(handle.pid)
                })
                .termination_order()
                .to_vec()
        } else {
            info!(component = %handle.kind, pid = %handle.pid, "Process already exited, sweeping its process group");
            Vec::new()
        };

        // Children reparented away from the root are only found through its group
        let stragglers: Vec<ProcessId> = match self.platform.process_group_members(handle.pid) {
            Ok(pids) => pids.into_iter().filter(|pid| !tree.contains(pid)).collect(),
            Err(e) => {
                debug!(pid = %handle.pid, error = %e, "Process group unavailable");
                Vec::new()
            }
        };
        let members: Vec<ProcessId> = stragglers.into_iter().chain(tree).collect();
        if members.is_empty() {
            return members;
        }

        info!(
            component = %handle.kind,
            root_pid = %handle.pid,
            members = members.len(),
            "Terminating process tree"
        );
        for pid in &members {
            let result = self.platform.terminate_gracefully(*pid).await;
            if !result.is_delivered_or_gone() {
                warn!(pid = %pid, result = %result, "Graceful termination failed");
            }
        }

        let survivors = self
            .wait_for_exit(handle, &members, config.grace_period())
            .await;
        if survivors.is_empty() {
            info!(component = %handle.kind, pid = %handle.pid, "Process tree terminated gracefully");
            return survivors;
        }

        warn!(
            component = %handle.kind,
            survivors = ?survivors,
            "Grace period elapsed, escalating to forced kill"
        );
        for pid in &survivors {
            let result = self.platform.force_kill(*pid).await;
            if !result.is_delivered_or_gone() {
                warn!(pid = %pid, result = %result, "Forced kill failed");
            }
        }
        self.wait_for_exit(handle, &survivors, config.force_wait())
            .await
    }

    async fn wait_for_exit(
        &self,
        handle: ProcessRef,
        pids: &[ProcessId],
        within: Duration,
    ) -> Vec<ProcessId> {
        let deadline = Instant::now() + within;
        loop {
            let survivors: Vec<ProcessId> = pids
                .iter()
                .copied()
                .filter(|pid| {
                    if *pid == handle.pid {
                        self.poll_root(handle).unwrap_or(false)
                    } else {
                        self.platform.is_alive(*pid)
                    }
                })
                .collect();
            if survivors.is_empty() || Instant::now() >= deadline {
                return survivors;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

impl<P: PlatformCapabilities> Drop for ProcessSupervisor<P> {
    fn drop(&mut self) {
        let table = self.table.get_mut().unwrap_or_else(PoisonError::into_inner);
        for record in table.processes.values_mut() {
            if matches!(record.child.try_wait(), Ok(None)) {
                warn!(
                    component = %record.kind,
                    pid = %record.pid,
                    "Emergency cleanup: killing process during drop"
                );
                if let Err(e) = record.child.start_kill() {
                    warn!(pid = %record.pid, error = %e, "Emergency kill failed");
                }
            }
        }
    }
}
