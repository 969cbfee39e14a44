//! C8Run Core - Platform-independent launcher abstractions
//!
//! This crate provides the capability trait implemented by the platform
//! crates, the shared command builders, configuration and error types, and
//! the supervisor/orchestrator pair that drives a local deployment.

pub mod capabilities;
pub mod command;
mod config;
mod error;
pub mod java;
mod orchestrator;
mod probe;
mod process;
mod supervisor;

pub use capabilities::{PlatformCapabilities, UnsupportedCapabilities};
pub use command::PlatformLayout;
pub use config::*;
pub use error::*;
pub use orchestrator::{Orchestrator, OrchestratorState, StatusReport};
pub use probe::*;
pub use process::*;
pub use supervisor::{ManagedProcess, ProcessSupervisor, ReadinessGate};
