use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::SystemTime;

/// Operating system process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The components of a local deployment, in launch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// Elasticsearch
    SearchEngine,
    /// Connector runtime
    ConnectorRuntime,
    /// Camunda (zeebe, operate, tasklist)
    MainRuntime,
}

impl ComponentKind {
    /// All components in the order they are started
    pub const LAUNCH_ORDER: [ComponentKind; 3] = [
        ComponentKind::SearchEngine,
        ComponentKind::ConnectorRuntime,
        ComponentKind::MainRuntime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::SearchEngine => "elasticsearch",
            ComponentKind::ConnectorRuntime => "connectors",
            ComponentKind::MainRuntime => "camunda",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last known status of a managed process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ProcessStatus {
    /// Spawned, readiness not yet confirmed
    Starting,
    /// Readiness probe succeeded
    Ready,
    /// Part of a fully started deployment
    Running,
    /// Process exited; the code is absent when it was killed by a signal
    Exited { code: Option<i32> },
    /// Process could not be supervised or terminated
    Failed { reason: String },
}

impl ProcessStatus {
    /// Whether the process is believed to be alive
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Ready | ProcessStatus::Running
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Starting => f.write_str("starting"),
            ProcessStatus::Ready => f.write_str("ready"),
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::Exited { code: Some(code) } => write!(f, "exited with code {code}"),
            ProcessStatus::Exited { code: None } => f.write_str("exited by signal"),
            ProcessStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of a single signal or kill operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Signal was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    pub fn is_delivered_or_gone(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

impl fmt::Display for TerminationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationResult::Success => f.write_str("success"),
            TerminationResult::ProcessNotFound => f.write_str("process not found"),
            TerminationResult::AccessDenied => f.write_str("access denied"),
            TerminationResult::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Lightweight reference to a process owned by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessRef {
    pub kind: ComponentKind,
    pub pid: ProcessId,
}

/// Point-in-time view of one managed process
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub kind: ComponentKind,
    pub pid: ProcessId,
    #[serde(flatten)]
    pub status: ProcessStatus,
    pub started_at: SystemTime,
}

/// Snapshot of a process and all of its transitive descendants.
///
/// Members are stored deepest-first with the root always last, which is the
/// order in which they can be terminated without orphaning grandchildren
/// before their parents are signalled. The snapshot goes stale as soon as any
/// member forks or exits, so callers recompute it before every termination
/// pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTree {
    root: ProcessId,
    members: Vec<ProcessId>,
}

impl ProcessTree {
    /// Tree containing only the root, used when enumeration is unavailable
    pub fn root_only(root: ProcessId) -> Self {
        Self {
            root,
            members: vec![root],
        }
    }

    /// Build a tree from `(pid, parent_pid)` pairs of a process table snapshot
    pub fn from_parent_links<I>(root: ProcessId, links: I) -> Self
    where
        I: IntoIterator<Item = (ProcessId, ProcessId)>,
    {
        let mut children: HashMap<ProcessId, Vec<ProcessId>> = HashMap::new();
        for (pid, parent) in links {
            if pid != parent {
                children.entry(parent).or_default().push(pid);
            }
        }
        // Sorting keeps the order deterministic for identical snapshots
        for list in children.values_mut() {
            list.sort();
        }

        let mut members = Vec::new();
        let mut visited = HashSet::from([root]);
        Self::collect_post_order(root, &children, &mut visited, &mut members);
        members.push(root);

        Self { root, members }
    }

    // Pid reuse can produce parent cycles on some platforms, hence `visited`
    fn collect_post_order(
        parent: ProcessId,
        children: &HashMap<ProcessId, Vec<ProcessId>>,
        visited: &mut HashSet<ProcessId>,
        out: &mut Vec<ProcessId>,
    ) {
        let Some(direct) = children.get(&parent) else {
            return;
        };
        for child in direct {
            if visited.insert(*child) {
                Self::collect_post_order(*child, children, visited, out);
                out.push(*child);
            }
        }
    }

    pub fn root(&self) -> ProcessId {
        self.root
    }

    /// Members in termination order: leaves first, root last
    pub fn termination_order(&self) -> &[ProcessId] {
        &self.members
    }

    /// Every member except the root
    pub fn descendants(&self) -> &[ProcessId] {
        &self.members[..self.members.len() - 1]
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.members.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Fully specified command that has not been started yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: std::path::PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<std::path::PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<std::path::PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<S: Into<String>, I: IntoIterator<Item = S>>(mut self, iter: I) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment override; a later value for the same key wins
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human readable command line for logs
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Consume the spec into a tokio command ready to spawn
    pub fn into_command(self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}
