//! c8run - local launcher for a Camunda 8 Run distribution
//!
//! Starts elasticsearch, the connector runtime and camunda in order, waits for
//! each one to report healthy, and tears the whole process trees down again.
//! The platform provider is picked at compile time by [`PlatformFactory`].

mod factory;
mod http_probe;
mod launcher;
pub mod logging;

pub use factory::{NativePlatform, PlatformFactory};
pub use http_probe::{HttpProbe, http_probes};
pub use launcher::{C8Run, RunOutcome};
pub use logging::{LogFormat, init_logging};

// Re-export core functionality
pub use c8run_core::*;
