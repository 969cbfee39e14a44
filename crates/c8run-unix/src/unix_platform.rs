use async_trait::async_trait;
use c8run_core::{C8RunError, CommandSpec, PlatformCapabilities, ProcessId, ProcessTree, TerminationResult};
use std::path::Path;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use c8run_core::PlatformLayout;
    use c8run_core::command;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::process::Stdio;
    use std::sync::{Mutex, PoisonError};
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
    use tokio::process::Command;
    use tracing::{debug, info, warn};

    /// Unix-like capability provider backed by sysinfo and POSIX signals
    pub struct UnixPlatform {
        system: Mutex<System>,
    }

    impl Default for UnixPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl UnixPlatform {
        pub fn new() -> Self {
            info!("Initializing Unix platform with system monitoring");
            Self {
                system: Mutex::new(System::new()),
            }
        }

        fn browser_opener() -> &'static str {
            if cfg!(target_os = "macos") {
                "open"
            } else {
                "xdg-open"
            }
        }

        fn signal(pid: ProcessId, sig: Signal) -> TerminationResult {
            // kill(2) treats 0 and negative pids as process groups
            let nix_pid = match i32::try_from(pid.0) {
                Ok(raw) if raw > 0 => NixPid::from_raw(raw),
                _ => return TerminationResult::Failed(format!("invalid pid {pid}")),
            };
            match signal::kill(nix_pid, sig) {
                Ok(()) => {
                    debug!(pid = %pid, signal = %sig, "Sent signal");
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    debug!(pid = %pid, "Process not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!(pid = %pid, signal = %sig, "Permission denied");
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!(pid = %pid, signal = %sig, error = %e, "Failed to send signal");
                    TerminationResult::Failed(format!("{sig} failed: {e}"))
                }
            }
        }
    }

    #[async_trait]
    impl PlatformCapabilities for UnixPlatform {
        fn platform_name(&self) -> &'static str {
            "unix"
        }

        async fn open_url(&self, url: &str) -> Result<(), C8RunError> {
            let opener = Self::browser_opener();
            let opener_path = which::which(opener).map_err(|e| C8RunError::BrowserLaunch {
                url: url.to_string(),
                reason: format!("no browser handler ({opener}): {e}"),
            })?;

            // The child is not awaited; tokio reaps it in the background
            Command::new(opener_path)
                .arg(url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| C8RunError::BrowserLaunch {
                    url: url.to_string(),
                    reason: format!("{opener} failed to start: {e}"),
                })?;
            info!(url = %url, "Opened browser");
            Ok(())
        }

        fn process_tree(&self, root: ProcessId) -> Result<ProcessTree, C8RunError> {
            if !sysinfo::IS_SUPPORTED_SYSTEM {
                warn!(pid = %root, "Process enumeration unsupported, using root only");
                return Ok(ProcessTree::root_only(root));
            }

            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing(),
            );

            if system.process(Pid::from_u32(root.0)).is_none() {
                debug!(pid = %root, "Root not in process table");
                return Ok(ProcessTree::root_only(root));
            }

            let links = system
                .processes()
                .iter()
                .filter(|(_, process)| process.thread_kind().is_none())
                .filter_map(|(pid, process)| {
                    process
                        .parent()
                        .map(|parent| (ProcessId(pid.as_u32()), ProcessId(parent.as_u32())))
                });
            let tree = ProcessTree::from_parent_links(root, links);
            debug!(pid = %root, members = ?tree.termination_order(), "Enumerated process tree");
            Ok(tree)
        }

        fn process_group_members(&self, leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError> {
            let leader_pid = match i32::try_from(leader.0) {
                Ok(raw) if raw > 0 => NixPid::from_raw(raw),
                _ => return Ok(Vec::new()),
            };
            if !sysinfo::IS_SUPPORTED_SYSTEM {
                return Ok(Vec::new());
            }

            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing(),
            );

            let mut members: Vec<ProcessId> = system
                .processes()
                .iter()
                .filter(|(pid, process)| {
                    pid.as_u32() != leader.0
                        && process.thread_kind().is_none()
                        && process.status() != sysinfo::ProcessStatus::Zombie
                })
                .filter_map(|(pid, _)| {
                    let raw = i32::try_from(pid.as_u32()).ok()?;
                    // Processes that exited since the refresh fail with ESRCH
                    let group = nix::unistd::getpgid(Some(NixPid::from_raw(raw))).ok()?;
                    (group == leader_pid).then(|| ProcessId(pid.as_u32()))
                })
                .collect();
            members.sort();
            debug!(leader = %leader, members = ?members, "Enumerated process group");
            Ok(members)
        }

        fn version_cmd(&self, java_binary: &Path) -> Result<CommandSpec, C8RunError> {
            command::version_cmd(java_binary)
        }

        fn elasticsearch_cmd(
            &self,
            elasticsearch_version: &str,
            parent_dir: &Path,
        ) -> Result<CommandSpec, C8RunError> {
            command::elasticsearch_cmd(PlatformLayout::UNIX, elasticsearch_version, parent_dir)
        }

        fn connectors_cmd(
            &self,
            java_binary: &Path,
            parent_dir: &Path,
            camunda_version: &str,
        ) -> Result<CommandSpec, C8RunError> {
            command::connectors_cmd(PlatformLayout::UNIX, java_binary, parent_dir, camunda_version)
        }

        fn camunda_cmd(
            &self,
            camunda_version: &str,
            parent_dir: &Path,
            extra_args: &[String],
            java_opts: Option<&str>,
        ) -> Result<CommandSpec, C8RunError> {
            command::camunda_cmd(
                PlatformLayout::UNIX,
                camunda_version,
                parent_dir,
                extra_args,
                java_opts,
            )
        }

        fn prepare_command(&self, command: &mut Command) -> Result<(), C8RunError> {
            // Own process group: terminal Ctrl-C reaches the launcher only
            command.process_group(0);
            Ok(())
        }

        async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
            Self::signal(pid, Signal::SIGTERM)
        }

        async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
            Self::signal(pid, Signal::SIGKILL)
        }

        fn is_alive(&self, pid: ProcessId) -> bool {
            let sys_pid = Pid::from_u32(pid.0);
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
            system
                .process(sys_pid)
                .is_some_and(|p| p.status() != sysinfo::ProcessStatus::Zombie)
        }
    }
}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::UnixPlatform;

/// Unix provider compiled for a non-unix target; every operation fails
#[cfg(not(unix))]
#[derive(Default)]
pub struct UnixPlatform;

#[cfg(not(unix))]
impl UnixPlatform {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(operation: &'static str) -> C8RunError {
        C8RunError::unsupported("unix", operation)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl PlatformCapabilities for UnixPlatform {
    fn platform_name(&self) -> &'static str {
        "unix"
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
        TerminationResult::Failed("platform was not built for unix".to_string())
    }

    async fn force_kill(&self, _pid: ProcessId) -> TerminationResult {
        TerminationResult::Failed("platform was not built for unix".to_string())
    }

    fn is_alive(&self, _pid: ProcessId) -> bool {
        false
    }
}
