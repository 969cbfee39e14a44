use c8run_core::C8RunError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Output format of the launcher log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = C8RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(C8RunError::Configuration(format!(
                "unknown log format '{other}', expected 'pretty' or 'json'"
            ))),
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level` when set. Calling this again after a
/// subscriber is installed returns an error and leaves the first one active.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), C8RunError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| C8RunError::Configuration(format!("invalid log level '{level}': {e}")))?;

    let result = match format {
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(false).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
    };
    result.map_err(|e| C8RunError::Configuration(format!("logging already initialized: {e}")))?;

    info!(level, format = ?format, "Logging initialized");
    Ok(())
}
