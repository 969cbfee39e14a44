use async_trait::async_trait;
use c8run_core::{C8RunError, CommandSpec, PlatformCapabilities, ProcessId, ProcessTree, TerminationResult};
use std::path::Path;

/// What a failed taskkill run means for the caller
#[derive(Debug, PartialEq)]
#[cfg_attr(not(windows), allow(dead_code))]
enum TaskkillOutcome {
    Done(TerminationResult),
    /// Close request refused, only `/F` can end the process
    ForceRequired,
}

#[cfg_attr(not(windows), allow(dead_code))]
fn classify_taskkill_failure(stderr: &str, force: bool) -> TaskkillOutcome {
    let stderr = stderr.to_lowercase();
    if stderr.contains("not found") {
        TaskkillOutcome::Done(TerminationResult::ProcessNotFound)
    } else if stderr.contains("access is denied") {
        TaskkillOutcome::Done(TerminationResult::AccessDenied)
    } else if !force && stderr.contains("terminated forcefully") {
        TaskkillOutcome::ForceRequired
    } else {
        TaskkillOutcome::Done(TerminationResult::Failed(format!(
            "taskkill failed: {}",
            stderr.trim()
        )))
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use c8run_core::PlatformLayout;
    use c8run_core::command;
    use std::process::Stdio;
    use std::sync::{Mutex, PoisonError};
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
    use tokio::process::Command;
    use tracing::{debug, info, warn};
    use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};

    /// Windows capability provider backed by sysinfo and taskkill
    pub struct WindowsPlatform {
        system: Mutex<System>,
    }

    impl Default for WindowsPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WindowsPlatform {
        pub fn new() -> Self {
            info!("Initializing Windows platform with system monitoring");
            Self {
                system: Mutex::new(System::new()),
            }
        }

        /// Use taskkill to terminate a single process
        ///
        /// Without `/F` taskkill posts a close request, which console
        /// processes are free to ignore. Processes without a window refuse
        /// the request outright, those are killed with `/F` right away.
        async fn taskkill(&self, pid: ProcessId, force: bool) -> TerminationResult {
            match self.run_taskkill(pid, force).await {
                TaskkillOutcome::Done(result) => result,
                TaskkillOutcome::ForceRequired => {
                    info!(pid = %pid, "Process only accepts forced termination, escalating");
                    match self.run_taskkill(pid, true).await {
                        TaskkillOutcome::Done(result) => result,
                        TaskkillOutcome::ForceRequired => {
                            TerminationResult::Failed("taskkill /F was refused".to_string())
                        }
                    }
                }
            }
        }

        async fn run_taskkill(&self, pid: ProcessId, force: bool) -> TaskkillOutcome {
            let pid_string = pid.to_string();
            let mut args = vec!["/PID", pid_string.as_str()];
            if force {
                args.push("/F");
            }

            let output = match Command::new("taskkill")
                .args(&args)
                .stdin(Stdio::null())
                .creation_flags(CREATE_NO_WINDOW.0)
                .output()
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to run taskkill");
                    return TaskkillOutcome::Done(TerminationResult::Failed(format!(
                        "taskkill failed to start: {e}"
                    )));
                }
            };

            if output.status.success() {
                debug!(pid = %pid, force, "taskkill succeeded");
                return TaskkillOutcome::Done(TerminationResult::Success);
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            let outcome = classify_taskkill_failure(&stderr, force);
            match &outcome {
                TaskkillOutcome::Done(TerminationResult::ProcessNotFound) => {
                    debug!(pid = %pid, "Process not found (already terminated)")
                }
                TaskkillOutcome::Done(TerminationResult::AccessDenied) => {
                    warn!(pid = %pid, force, "Permission denied")
                }
                TaskkillOutcome::Done(_) => {
                    warn!(pid = %pid, force, status = %output.status, stderr = %stderr.trim(), "taskkill failed")
                }
                TaskkillOutcome::ForceRequired => {}
            }
            outcome
        }

        /// Parent links of a fresh snapshot
        ///
        /// Windows keeps stale parent ids, so a reused pid may claim a live
        /// process as parent. Such links are kept only when the parent started
        /// first. Links to a parent that no longer exists are kept when
        /// `keep_dead_parents` is set, which is how children of an exited
        /// component are still found.
        fn parent_links(system: &System, keep_dead_parents: bool) -> Vec<(ProcessId, ProcessId)> {
            system
                .processes()
                .iter()
                .filter_map(|(pid, process)| {
                    let parent_pid = process.parent()?;
                    let accepted = match system.process(parent_pid) {
                        Some(parent) => parent.start_time() <= process.start_time(),
                        None => keep_dead_parents,
                    };
                    accepted.then(|| (ProcessId(pid.as_u32()), ProcessId(parent_pid.as_u32())))
                })
                .collect()
        }

        fn refreshed(&self) -> std::sync::MutexGuard<'_, System> {
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing(),
            );
            system
        }
    }

    #[async_trait]
    impl PlatformCapabilities for WindowsPlatform {
        fn platform_name(&self) -> &'static str {
            "windows"
        }

        fn process_tree(&self, root: ProcessId) -> Result<ProcessTree, C8RunError> {
            let system = self.refreshed();
            if system.process(Pid::from_u32(root.0)).is_none() {
                debug!(pid = %root, "Root not in process table");
                return Ok(ProcessTree::root_only(root));
            }

            let tree = ProcessTree::from_parent_links(root, Self::parent_links(&system, false));
            debug!(pid = %root, members = ?tree.termination_order(), "Enumerated process tree");
            Ok(tree)
        }

        // Windows has no process groups to query, the closest equivalent is
        // everything that still names the exited leader as an ancestor
        fn process_group_members(&self, leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError> {
            let system = self.refreshed();
            let tree = ProcessTree::from_parent_links(leader, Self::parent_links(&system, true));
            debug!(leader = %leader, members = ?tree.descendants(), "Enumerated orphaned descendants");
            Ok(tree.descendants().to_vec())
        }

        async fn open_url(&self, url: &str) -> Result<(), C8RunError> {
            // The empty argument is the window title consumed by `start`
            Command::new("cmd")
                .args(["/C", "start", "", url])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(CREATE_NO_WINDOW.0)
                .spawn()
                .map_err(|e| C8RunError::BrowserLaunch {
                    url: url.to_string(),
                    reason: format!("cmd /C start failed: {e}"),
                })?;
            info!(url = %url, "Opened browser");
            Ok(())
        }

        fn version_cmd(&self, java_binary: &Path) -> Result<CommandSpec, C8RunError> {
            command::version_cmd(java_binary)
        }

        fn elasticsearch_cmd(
            &self,
            elasticsearch_version: &str,
            parent_dir: &Path,
        ) -> Result<CommandSpec, C8RunError> {
            command::elasticsearch_cmd(PlatformLayout::WINDOWS, elasticsearch_version, parent_dir)
        }

        fn connectors_cmd(
            &self,
            java_binary: &Path,
            parent_dir: &Path,
            camunda_version: &str,
        ) -> Result<CommandSpec, C8RunError> {
            command::connectors_cmd(
                PlatformLayout::WINDOWS,
                java_binary,
                parent_dir,
                camunda_version,
            )
        }

        fn camunda_cmd(
            &self,
            camunda_version: &str,
            parent_dir: &Path,
            extra_args: &[String],
            java_opts: Option<&str>,
        ) -> Result<CommandSpec, C8RunError> {
            command::camunda_cmd(
                PlatformLayout::WINDOWS,
                camunda_version,
                parent_dir,
                extra_args,
                java_opts,
            )
        }

        fn prepare_command(&self, command: &mut Command) -> Result<(), C8RunError> {
            // No console popup, and Ctrl-C in the launcher console is not forwarded
            command.creation_flags((CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP).0);
            Ok(())
        }

        async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
            self.taskkill(pid, false).await
        }

        async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
            self.taskkill(pid, true).await
        }

        fn is_alive(&self, pid: ProcessId) -> bool {
            let sys_pid = Pid::from_u32(pid.0);
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
            system.process(sys_pid).is_some()
        }
    }
}

#[cfg(windows)]
pub use windows_impl::WindowsPlatform;

/// Windows provider compiled for a non-windows target
///
/// Every operation reports `UnsupportedPlatform` instead of aborting, so a
/// misrouted call surfaces as an error the caller can handle.
#[cfg(not(windows))]
#[derive(Default)]
pub struct WindowsPlatform;

#[cfg(not(windows))]
impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(operation: &'static str) -> C8RunError {
        C8RunError::unsupported("windows", operation)
    }
}

#[cfg(not(windows))]
#[async_trait]
impl PlatformCapabilities for WindowsPlatform {
    fn platform_name(&self) -> &'static str {
        "windows"
    }

    async fn open_url(&self, _url: &str) -> Result<(), C8RunError> {
        Err(Self::unsupported("open_browser"))
    }

    fn process_tree(&self, _root: ProcessId) -> Result<ProcessTree, C8RunError> {
        Err(Self::unsupported("process_tree"))
    }

    fn process_group_members(&self, _leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError> {
        Err(Self::unsupported("process_group"))
    }

    fn version_cmd(&self, _java_binary: &Path) -> Result<CommandSpec, C8RunError> {
        Err(Self::unsupported("version_cmd"))
    }

    fn elasticsearch_cmd(&self, _version: &str, _dir: &Path) -> Result<CommandSpec, C8RunError> {
        Err(Self::unsupported("elasticsearch_cmd"))
    }

    fn connectors_cmd(
        &self,
        _java_binary: &Path,
        _dir: &Path,
        _version: &str,
    ) -> Result<CommandSpec, C8RunError> {
        Err(Self::unsupported("connectors_cmd"))
    }

    fn camunda_cmd(
        &self,
        _version: &str,
        _dir: &Path,
        _extra_args: &[String],
        _java_opts: Option<&str>,
    ) -> Result<CommandSpec, C8RunError> {
        Err(Self::unsupported("camunda_cmd"))
    }

    fn prepare_command(&self, _command: &mut tokio::process::Command) -> Result<(), C8RunError> {
        Err(Self::unsupported("launch"))
    }

    async fn terminate_gracefully(&self, _pid: ProcessId) -> TerminationResult {
        TerminationResult::Failed("platform was not built for windows".to_string())
    }

    async fn force_kill(&self, _pid: ProcessId) -> TerminationResult {
        TerminationResult::Failed("platform was not built for windows".to_string())
    }

    fn is_alive(&self, _pid: ProcessId) -> bool {
        false
    }
}
