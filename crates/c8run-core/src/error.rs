use crate::orchestrator::OrchestratorState;
use crate::process::{ComponentKind, ProcessId};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core error types for launcher operations
#[derive(Error, Debug)]
pub enum C8RunError {
    #[error("{operation} is not supported: platform was not built for {platform}")]
    UnsupportedPlatform {
        platform: &'static str,
        operation: &'static str,
    },

    #[error("Invalid command: {0}")]
    InvalidCommandSpec(String),

    #[error("Failed to launch {component} ({}): {source}", .program.display())]
    Launch {
        component: ComponentKind,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{component} did not become ready within {timeout:?}")]
    Timeout {
        component: ComponentKind,
        timeout: Duration,
    },

    #[error("{component} exited before becoming ready ({status})")]
    ExitedDuringStartup {
        component: ComponentKind,
        status: String,
    },

    #[error(transparent)]
    Termination(#[from] TerminationError),

    #[error("Failed to open browser at {url}: {reason}")]
    BrowserLaunch { url: String, reason: String },

    #[error("Cannot {operation} while the launcher is {state}")]
    StateConflict {
        state: OrchestratorState,
        operation: &'static str,
    },

    #[error("{component} is already running (PID {pid})")]
    AlreadyRunning {
        component: ComponentKind,
        pid: ProcessId,
    },

    #[error("Java {found} is not supported, Java {required} or newer is required")]
    UnsupportedJava { found: u32, required: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl C8RunError {
    pub fn unsupported(platform: &'static str, operation: &'static str) -> Self {
        C8RunError::UnsupportedPlatform {
            platform,
            operation,
        }
    }

    pub fn invalid_command(message: impl Into<String>) -> Self {
        C8RunError::InvalidCommandSpec(message.into())
    }

    /// Check if retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            C8RunError::Timeout { .. }
                | C8RunError::ExitedDuringStartup { .. }
                | C8RunError::BrowserLaunch { .. }
        )
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            C8RunError::UnsupportedPlatform { .. }
                | C8RunError::InvalidCommandSpec(_)
                | C8RunError::UnsupportedJava { .. }
                | C8RunError::Configuration(_)
        )
    }

    /// Non-zero process exit code for the CLI collaborator
    pub fn exit_code(&self) -> i32 {
        match self {
            C8RunError::Configuration(_) | C8RunError::InvalidCommandSpec(_) => 2,
            C8RunError::UnsupportedPlatform { .. } | C8RunError::UnsupportedJava { .. } => 3,
            C8RunError::Launch { .. } | C8RunError::ExitedDuringStartup { .. } => 4,
            C8RunError::Timeout { .. } => 5,
            C8RunError::Termination(_) => 6,
            C8RunError::StateConflict { .. } | C8RunError::AlreadyRunning { .. } => 7,
            C8RunError::Cancelled => 130,
            C8RunError::BrowserLaunch { .. } | C8RunError::Other(_) => 1,
        }
    }
}

/// A process that survived every termination attempt
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationFailure {
    pub component: ComponentKind,
    pub pid: ProcessId,
    pub reason: String,
}

impl fmt::Display for TerminationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (PID {}): {}", self.component, self.pid, self.reason)
    }
}

/// Aggregated failures of one termination pass
#[derive(Error, Debug, Clone, PartialEq, Default)]
pub struct TerminationError {
    pub failures: Vec<TerminationFailure>,
}

impl TerminationError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, failure: TerminationFailure) {
        self.failures.push(failure);
    }

    pub fn merge(&mut self, other: TerminationError) {
        self.failures.extend(other.failures);
    }

    pub fn components(&self) -> Vec<ComponentKind> {
        let mut kinds: Vec<_> = self.failures.iter().map(|f| f.component).collect();
        kinds.dedup();
        kinds
    }

    /// `Ok` when nothing failed
    pub fn into_result(self) -> Result<(), TerminationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for TerminationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to terminate {} process(es)", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}
