use async_trait::async_trait;
use c8run_core::{C8RunError, ComponentKind, ReadinessConfig, ReadinessProbe, ReadinessProbes};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Readiness probe that expects a 2xx answer from a health endpoint
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, C8RunError> {
        Ok(Self::with_client(client(request_timeout)?, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn client(request_timeout: Duration) -> Result<reqwest::Client, C8RunError> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| C8RunError::Configuration(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_ready(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url = %self.url, status = %status, "Health check answered");
                status.is_success()
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health check not reachable yet");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }
}

/// One HTTP probe per component, sharing a single client
pub fn http_probes(config: &ReadinessConfig) -> Result<ReadinessProbes, C8RunError> {
    let client = client(config.request_timeout())?;
    let probe = |kind: ComponentKind| -> Arc<dyn ReadinessProbe> {
        Arc::new(HttpProbe::with_client(
            client.clone(),
            config.health_url_for(kind),
        ))
    };
    Ok(ReadinessProbes::new(
        probe(ComponentKind::SearchEngine),
        probe(ComponentKind::ConnectorRuntime),
        probe(ComponentKind::MainRuntime),
    ))
}
