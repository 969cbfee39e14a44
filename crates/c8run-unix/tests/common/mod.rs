#![allow(dead_code)]

use async_trait::async_trait;
use c8run_core::{
    C8RunError, CommandSpec, LaunchConfig, PlatformCapabilities, ProcessId, ProcessTree,
    TerminationResult,
};
use c8run_unix::UnixPlatform;
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const CAMUNDA_VERSION: &str = "8.7.0";
pub const ELASTICSEARCH_VERSION: &str = "8.17.3";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .with_file(true)
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

fn write_script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Extracted-distribution lookalike whose start scripts just sleep
pub struct FakeDistribution {
    dir: TempDir,
}

impl FakeDistribution {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_script(
            &root.join(format!("elasticsearch-{ELASTICSEARCH_VERSION}/bin/elasticsearch")),
            "exec sleep 60",
        );
        // Forks a worker so the main runtime has a real process tree
        write_script(
            &root.join(format!("camunda-zeebe-{CAMUNDA_VERSION}/bin/camunda")),
            "sleep 60 &\nwait",
        );
        write_script(
            &root.join("jdk/bin/java"),
            "if [ \"$1\" = \"--version\" ]; then\n  echo 'openjdk 21.0.2 2024-01-16'\n  exit 0\nfi\nexec sleep 60",
        );
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn java_home(&self) -> PathBuf {
        self.root().join("jdk")
    }

    pub fn config(&self) -> LaunchConfig {
        let mut config = LaunchConfig::builder()
            .camunda_version(CAMUNDA_VERSION)
            .elasticsearch_version(ELASTICSEARCH_VERSION)
            .parent_dir(self.root())
            .java_home(self.java_home())
            .build()
            .unwrap();
        config.browser.open = false;
        config.readiness.poll_interval_ms = 50;
        config.readiness.elasticsearch_timeout_secs = 5;
        config.readiness.connectors_timeout_secs = 5;
        config.readiness.camunda_timeout_secs = 5;
        config.termination.grace_period_ms = 2_000;
        config.termination.force_wait_ms = 1_000;
        config
    }
}

/// Unix provider that records builder calls and can ignore signals for chosen pids
pub struct RecordingPlatform {
    inner: UnixPlatform,
    calls: Mutex<Vec<&'static str>>,
    stubborn: Mutex<HashSet<ProcessId>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            inner: UnixPlatform::new(),
            calls: Mutex::new(Vec::new()),
            stubborn: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls().contains(&name)
    }

    /// Signals sent to `pid` are reported as delivered but dropped
    pub fn ignore_signals_for(&self, pid: ProcessId) {
        self.stubborn.lock().unwrap().insert(pid);
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    fn is_stubborn(&self, pid: ProcessId) -> bool {
        self.stubborn.lock().unwrap().contains(&pid)
    }
}

#[async_trait]
impl PlatformCapabilities for RecordingPlatform {
    fn platform_name(&self) -> &'static str {
        "recording-unix"
    }

    async fn open_url(&self, _url: &str) -> Result<(), C8RunError> {
        self.record("open_browser");
        Ok(())
    }

    fn process_tree(&self, root: ProcessId) -> Result<ProcessTree, C8RunError> {
        self.inner.process_tree(root)
    }

    fn process_group_members(&self, leader: ProcessId) -> Result<Vec<ProcessId>, C8RunError> {
        self.inner.process_group_members(leader)
    }

    fn version_cmd(&self, java_binary: &Path) -> Result<CommandSpec, C8RunError> {
        self.record("version_cmd");
        self.inner.version_cmd(java_binary)
    }

    fn elasticsearch_cmd(&self, version: &str, dir: &Path) -> Result<CommandSpec, C8RunError> {
        self.record("elasticsearch_cmd");
        self.inner.elasticsearch_cmd(version, dir)
    }

    fn connectors_cmd(
        &self,
        java_binary: &Path,
        dir: &Path,
        version: &str,
    ) -> Result<CommandSpec, C8RunError> {
        self.record("connectors_cmd");
        self.inner.connectors_cmd(java_binary, dir, version)
    }

    fn camunda_cmd(
        &self,
        version: &str,
        dir: &Path,
        extra_args: &[String],
        java_opts: Option<&str>,
    ) -> Result<CommandSpec, C8RunError> {
        self.record("camunda_cmd");
        self.inner.camunda_cmd(version, dir, extra_args, java_opts)
    }

    fn prepare_command(&self, command: &mut tokio::process::Command) -> Result<(), C8RunError> {
        self.inner.prepare_command(command)
    }

    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
        if self.is_stubborn(pid) {
            return TerminationResult::Success;
        }
        self.inner.terminate_gracefully(pid).await
    }

    async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
        if self.is_stubborn(pid) {
            return TerminationResult::Success;
        }
        self.inner.force_kill(pid).await
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        self.inner.is_alive(pid)
    }
}

pub fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("/bin/sh").args(["-c", script])
}
