use crate::process::ComponentKind;
use async_trait::async_trait;
use std::sync::Arc;

/// Health check polled by the supervisor until a component accepts traffic
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self) -> bool;

    fn describe(&self) -> String {
        "custom probe".to_string()
    }
}

/// Probe backed by a plain closure
pub struct FnProbe<F> {
    check: F,
}

impl<F> FnProbe<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F> ReadinessProbe for FnProbe<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn is_ready(&self) -> bool {
        (self.check)()
    }
}

/// Probe that succeeds immediately
pub struct AlwaysReady;

#[async_trait]
impl ReadinessProbe for AlwaysReady {
    async fn is_ready(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "always ready".to_string()
    }
}

/// One probe per managed component
#[derive(Clone)]
pub struct ReadinessProbes {
    pub search_engine: Arc<dyn ReadinessProbe>,
    pub connector_runtime: Arc<dyn ReadinessProbe>,
    pub main_runtime: Arc<dyn ReadinessProbe>,
}

impl ReadinessProbes {
    pub fn new(
        search_engine: Arc<dyn ReadinessProbe>,
        connector_runtime: Arc<dyn ReadinessProbe>,
        main_runtime: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            search_engine,
            connector_runtime,
            main_runtime,
        }
    }

    /// Every component is considered ready as soon as it is spawned
    pub fn always_ready() -> Self {
        Self::new(
            Arc::new(AlwaysReady),
            Arc::new(AlwaysReady),
            Arc::new(AlwaysReady),
        )
    }

    pub fn for_kind(&self, kind: ComponentKind) -> Arc<dyn ReadinessProbe> {
        match kind {
            ComponentKind::SearchEngine => self.search_engine.clone(),
            ComponentKind::ConnectorRuntime => self.connector_runtime.clone(),
            ComponentKind::MainRuntime => self.main_runtime.clone(),
        }
    }
}
