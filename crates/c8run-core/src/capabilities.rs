use crate::error::C8RunError;
use crate::process::{CommandSpec, ProcessId, ProcessTree, TerminationResult};
use async_trait::async_trait;
use std::path::Path;

/// Platform capability provider
///
/// Exactly one implementation is selected per build target. It knows how to
/// open a browser, how to enumerate and signal process trees, and how each
/// managed component is launched on the host. Command builders are pure: they
/// validate their inputs and return a [`CommandSpec`] without spawning
/// anything, spawning is the supervisor's job.
///
/// Providers for targets they were not built for still implement the trait,
/// but every operation returns [`C8RunError::UnsupportedPlatform`].
#[async_trait]
pub trait PlatformCapabilities: Send + Sync + 'static {
    /// Platform name for logging and error messages
    fn platform_name(&self) -> &'static str;

    /// Launch the default browser at `protocol://localhost:port/operate`
    ///
    /// Fire-and-forget: returns once the opener has been spawned.
    async fn open_browser(&self, protocol: &str, port: u16) -> Result<(), C8RunError> {
        self.open_url(&crate::command::browser_url(protocol, port))
            .await
    }

    /// Launch the default browser at an explicit URL
    async fn open_url(&self, url: &str) -> Result<(), C8RunError>;

    /// Snapshot of `root` and all its descendants, root last
    ///
    /// When the host cannot enumerate processes the tree holds the root alone.
    fn process_tree(&self, root: ProcessId) -> Result<ProcessTree, C8RunError>;

    /// Processes still in the group led by `leader`, excluding the leader
    ///
    /// Every component is spawned as a group leader, so this finds children
    /// that were reparented after their parent exited.
    fn process_group_members(&self, leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError>;

    /// `java --version`
    fn version_cmd(&self, java_binary: &Path) -> Result<CommandSpec, C8RunError>;

    fn elasticsearch_cmd(
        &self,
        elasticsearch_version: &str,
        parent_dir: &Path,
    ) -> Result<CommandSpec, C8RunError>;

    fn connectors_cmd(
        &self,
        java_binary: &Path,
        parent_dir: &Path,
        camunda_version: &str,
    ) -> Result<CommandSpec, C8RunError>;

    fn camunda_cmd(
        &self,
        camunda_version: &str,
        parent_dir: &Path,
        extra_args: &[String],
        java_opts: Option<&str>,
    ) -> Result<CommandSpec, C8RunError>;

    /// Adjust a command before it is spawned (process group, console flags)
    fn prepare_command(&self, command: &mut tokio::process::Command) -> Result<(), C8RunError>;

    /// Ask a single process to shut down
    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult;

    /// Kill a single process without giving it a chance to clean up
    async fn force_kill(&self, pid: ProcessId) -> TerminationResult;

    /// Whether a process that is not our direct child still runs
    fn is_alive(&self, pid: ProcessId) -> bool;
}

/// Provider for targets without a real implementation
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedCapabilities {
    platform: &'static str,
}

impl UnsupportedCapabilities {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PlatformCapabilities for UnsupportedCapabilities {
    fn platform_name(&self) -> &'static str {
        self.platform
    }

    async fn open_url(&self, _url: &str) -> Result<(), C8RunError> {
        Err(C8RunError::unsupported(self.platform, "open_browser"))
    }

    fn process_tree(&self, _root: ProcessId) -> Result<ProcessTree, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "process_tree"))
    }

    fn process_group_members(&self, _leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "process_group"))
    }

    fn version_cmd(&self, _java_binary: &Path) -> Result<CommandSpec, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "version_cmd"))
    }

    fn elasticsearch_cmd(&self, _version: &str, _dir: &Path) -> Result<CommandSpec, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "elasticsearch_cmd"))
    }

    fn connectors_cmd(
        &self,
        _java_binary: &Path,
        _dir: &Path,
        _version: &str,
    ) -> Result<CommandSpec, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "connectors_cmd"))
    }

    fn camunda_cmd(
        &self,
        _version: &str,
        _dir: &Path,
        _extra_args: &[String],
        _java_opts: Option<&str>,
    ) -> Result<CommandSpec, C8RunError> {
        Err(C8RunError::unsupported(self.platform, "camunda_cmd"))
    }

    fn prepare_command(&self, _command: &mut tokio::process::Command) -> Result<(), C8RunError> {
        Err(C8RunError::unsupported(self.platform, "launch"))
    }

    async fn terminate_gracefully(&self, _pid: ProcessId) -> TerminationResult {
        TerminationResult::Failed(format!(
            "terminate is not supported: platform was not built for {}",
            self.platform
        ))
    }

    async fn force_kill(&self, _pid: ProcessId) -> TerminationResult {
        TerminationResult::Failed(format!(
            "kill is not supported: platform was not built for {}",
            self.platform
        ))
    }

    fn is_alive(&self, _pid: ProcessId) -> bool {
        false
    }
}
