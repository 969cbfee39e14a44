use crate::error::C8RunError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where and how the browser is opened once the deployment is up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Open the browser after the main runtime reports ready
    #[serde(default = "default_open_browser")]
    pub open: bool,

    /// `http` or `https`
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Port of the web applications
    #[serde(default = "default_port")]
    pub port: u16,

    /// Replaces the computed `protocol://localhost:port/operate` target
    #[serde(default)]
    pub startup_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            open: default_open_browser(),
            protocol: default_protocol(),
            port: default_port(),
            startup_url: None,
        }
    }
}

impl BrowserConfig {
    pub fn validate(&self) -> Result<(), C8RunError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(C8RunError::Configuration(format!(
                "protocol must be http or https, got {:?}",
                self.protocol
            )));
        }
        if self.port == 0 {
            return Err(C8RunError::Configuration(
                "port must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Readiness polling for each component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessConfig {
    /// Delay between two probe attempts (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout of a single health request (in milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_elasticsearch_timeout_secs")]
    pub elasticsearch_timeout_secs: u64,

    #[serde(default = "default_connectors_timeout_secs")]
    pub connectors_timeout_secs: u64,

    #[serde(default = "default_camunda_timeout_secs")]
    pub camunda_timeout_secs: u64,

    #[serde(default = "default_elasticsearch_health_url")]
    pub elasticsearch_health_url: String,

    #[serde(default = "default_connectors_health_url")]
    pub connectors_health_url: String,

    #[serde(default = "default_camunda_health_url")]
    pub camunda_health_url: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            elasticsearch_timeout_secs: default_elasticsearch_timeout_secs(),
            connectors_timeout_secs: default_connectors_timeout_secs(),
            camunda_timeout_secs: default_camunda_timeout_secs(),
            elasticsearch_health_url: default_elasticsearch_health_url(),
            connectors_health_url: default_connectors_health_url(),
            camunda_health_url: default_camunda_health_url(),
        }
    }
}

impl ReadinessConfig {
    pub fn validate(&self) -> Result<(), C8RunError> {
        if self.poll_interval_ms == 0 {
            return Err(C8RunError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        for (name, secs) in [
            ("elasticsearch_timeout_secs", self.elasticsearch_timeout_secs),
            ("connectors_timeout_secs", self.connectors_timeout_secs),
            ("camunda_timeout_secs", self.camunda_timeout_secs),
        ] {
            if secs == 0 {
                return Err(C8RunError::Configuration(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn timeout_for(&self, kind: crate::ComponentKind) -> Duration {
        let secs = match kind {
            crate::ComponentKind::SearchEngine => self.elasticsearch_timeout_secs,
            crate::ComponentKind::ConnectorRuntime => self.connectors_timeout_secs,
            crate::ComponentKind::MainRuntime => self.camunda_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn health_url_for(&self, kind: crate::ComponentKind) -> &str {
        match kind {
            crate::ComponentKind::SearchEngine => &self.elasticsearch_health_url,
            crate::ComponentKind::ConnectorRuntime => &self.connectors_health_url,
            crate::ComponentKind::MainRuntime => &self.camunda_health_url,
        }
    }
}

/// Graceful-then-forceful termination timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerminationConfig {
    /// Time a process tree gets to exit after the graceful signal (in milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Time to wait for exit after the forced kill (in milliseconds)
    #[serde(default = "default_force_wait_ms")]
    pub force_wait_ms: u64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            force_wait_ms: default_force_wait_ms(),
        }
    }
}

impl TerminationConfig {
    pub fn validate(&self) -> Result<(), C8RunError> {
        if self.grace_period_ms > 120_000 {
            return Err(C8RunError::Configuration(
                "grace_period_ms should not exceed 120 seconds".to_string(),
            ));
        }
        if self.force_wait_ms == 0 {
            return Err(C8RunError::Configuration(
                "force_wait_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn force_wait(&self) -> Duration {
        Duration::from_millis(self.force_wait_ms)
    }
}

/// Resolved inputs for one launcher session
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into, strip_option))]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub camunda_version: String,
    pub elasticsearch_version: String,
    /// Root directory holding the extracted distributions
    pub parent_dir: PathBuf,
    #[builder(default)]
    #[serde(default)]
    pub java_home: Option<PathBuf>,
    /// Extra arguments passed to the camunda start script
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[builder(default)]
    #[serde(default)]
    pub java_opts: Option<String>,
    /// Alternative spring configuration for camunda, relative to `parent_dir`
    #[builder(default)]
    #[serde(default)]
    pub camunda_config: Option<PathBuf>,
    #[builder(default)]
    #[serde(default)]
    pub disable_elasticsearch: bool,
    #[builder(default = "true")]
    #[serde(default = "default_check_java_version")]
    pub check_java_version: bool,
    #[builder(default)]
    #[serde(default)]
    pub browser: BrowserConfig,
    #[builder(default)]
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[builder(default)]
    #[serde(default)]
    pub termination: TerminationConfig,
}

impl LaunchConfig {
    pub fn builder() -> LaunchConfigBuilder {
        LaunchConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), C8RunError> {
        if self.camunda_version.trim().is_empty() {
            return Err(C8RunError::Configuration(
                "camunda version must not be empty".to_string(),
            ));
        }
        if !self.disable_elasticsearch && self.elasticsearch_version.trim().is_empty() {
            return Err(C8RunError::Configuration(
                "elasticsearch version must not be empty".to_string(),
            ));
        }
        self.browser.validate()?;
        self.readiness.validate()?;
        self.termination.validate()
    }

    /// Components this configuration starts, in launch order
    pub fn components(&self) -> Vec<crate::ComponentKind> {
        crate::ComponentKind::LAUNCH_ORDER
            .into_iter()
            .filter(|kind| {
                !(self.disable_elasticsearch && *kind == crate::ComponentKind::SearchEngine)
            })
            .collect()
    }
}

impl LaunchConfigBuilder {
    pub fn extra_args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.extra_args = Some(args);
        self
    }
}

// Default value functions for serde
fn default_open_browser() -> bool {
    true
}
fn default_protocol() -> String {
    "http".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_elasticsearch_timeout_secs() -> u64 {
    120
}
fn default_connectors_timeout_secs() -> u64 {
    120
}
fn default_camunda_timeout_secs() -> u64 {
    300
}
fn default_elasticsearch_health_url() -> String {
    "http://localhost:9200/_cluster/health".to_string()
}
fn default_connectors_health_url() -> String {
    "http://localhost:8086/actuator/health/readiness".to_string()
}
fn default_camunda_health_url() -> String {
    "http://localhost:9600/actuator/health/status".to_string()
}
fn default_grace_period_ms() -> u64 {
    10_000
}
fn default_force_wait_ms() -> u64 {
    3_000
}
fn default_check_java_version() -> bool {
    true
}
