#![cfg(unix)]

mod common;

use c8run_core::{
    AlwaysReady, C8RunError, ComponentKind, FnProbe, Orchestrator, OrchestratorState,
    PlatformCapabilities, ProcessStatus, ReadinessProbes,
};
use common::{FakeDistribution, RecordingPlatform, init_tracing};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator() -> (Arc<RecordingPlatform>, Orchestrator<RecordingPlatform>) {
    let platform = Arc::new(RecordingPlatform::new());
    (platform.clone(), Orchestrator::new(platform))
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_start_and_stop_full_deployment() {
    init_tracing();
    let dist = FakeDistribution::new();
    let (platform, orchestrator) = orchestrator();

    orchestrator
        .start(&dist.config(), ReadinessProbes::always_ready())
        .await
        .unwrap();
    assert_eq!(
        platform.calls(),
        vec!["version_cmd", "elasticsearch_cmd", "connectors_cmd", "camunda_cmd"]
    );

    let report = orchestrator.status();
    assert_eq!(report.state, OrchestratorState::Running);
    let kinds: Vec<_> = report.components.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, ComponentKind::LAUNCH_ORDER.to_vec());
    assert!(
        report
            .components
            .iter()
            .all(|c| c.status == ProcessStatus::Running)
    );

    // The main runtime script forks a worker; it must go down with its parent
    let camunda = report.component(ComponentKind::MainRuntime).unwrap().pid;
    assert!(
        wait_for(|| platform.process_tree(camunda).unwrap().len() >= 2).await,
        "camunda worker never appeared"
    );
    let tree = platform.process_tree(camunda).unwrap();

    orchestrator.stop().await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert!(orchestrator.status().components.is_empty());
    for pid in tree.termination_order() {
        assert!(!platform.is_alive(*pid), "{pid} survived stop");
    }
    for component in &report.components {
        assert!(!platform.is_alive(component.pid));
    }
}

#[tokio::test]
async fn test_readiness_timeout_rolls_back() {
    init_tracing();
    let dist = FakeDistribution::new();
    let mut config = dist.config();
    config.readiness.elasticsearch_timeout_secs = 1;
    let (platform, orchestrator) = orchestrator();

    let probes = ReadinessProbes::new(
        Arc::new(FnProbe::new(|| false)),
        Arc::new(AlwaysReady),
        Arc::new(AlwaysReady),
    );
    let result = orchestrator.start(&config, probes).await;
    assert!(matches!(
        result,
        Err(C8RunError::Timeout {
            component: ComponentKind::SearchEngine,
            ..
        })
    ));

    assert!(platform.called("elasticsearch_cmd"));
    assert!(!platform.called("connectors_cmd"));
    assert!(!platform.called("camunda_cmd"));
    assert!(matches!(
        orchestrator.state(),
        OrchestratorState::Failed { .. }
    ));
    assert!(orchestrator.status().components.is_empty());

    orchestrator.stop().await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn test_externally_killed_component_degrades() {
    init_tracing();
    let dist = FakeDistribution::new();
    let (_platform, orchestrator) = orchestrator();

    orchestrator
        .start(&dist.config(), ReadinessProbes::always_ready())
        .await
        .unwrap();
    let connectors = orchestrator
        .status()
        .component(ComponentKind::ConnectorRuntime)
        .unwrap()
        .pid;
    signal::kill(Pid::from_raw(connectors.0 as i32), Signal::SIGKILL).unwrap();

    assert!(
        wait_for(|| matches!(orchestrator.status().state, OrchestratorState::Degraded { .. }))
            .await,
        "state never degraded"
    );
    let report = orchestrator.status();
    assert_eq!(
        report.state,
        OrchestratorState::Degraded {
            exited: vec![ComponentKind::ConnectorRuntime]
        }
    );
    assert!(matches!(
        report
            .component(ComponentKind::ConnectorRuntime)
            .unwrap()
            .status,
        ProcessStatus::Exited { .. }
    ));
    for kind in [ComponentKind::SearchEngine, ComponentKind::MainRuntime] {
        assert_eq!(
            report.component(kind).unwrap().status,
            ProcessStatus::Running
        );
    }

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_reports_only_unkillable_component() {
    init_tracing();
    let dist = FakeDistribution::new();
    let mut config = dist.config();
    config.termination.grace_period_ms = 300;
    config.termination.force_wait_ms = 300;
    let (platform, orchestrator) = orchestrator();

    orchestrator
        .start(&config, ReadinessProbes::always_ready())
        .await
        .unwrap();
    let report = orchestrator.status();
    let connectors = report.component(ComponentKind::ConnectorRuntime).unwrap().pid;
    platform.ignore_signals_for(connectors);

    let result = orchestrator.stop().await;
    match result {
        Err(C8RunError::Termination(error)) => {
            assert_eq!(error.components(), vec![ComponentKind::ConnectorRuntime]);
            assert!(error.failures.iter().all(|f| f.pid == connectors));
        }
        other => panic!("expected termination error, got {other:?}"),
    }
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);

    for kind in [ComponentKind::SearchEngine, ComponentKind::MainRuntime] {
        let pid = report.component(kind).unwrap().pid;
        assert!(!platform.is_alive(pid), "{kind} survived stop");
    }

    // Dropping the orchestrator kills what stop could not
    drop(orchestrator);
    assert!(wait_for(|| !platform.is_alive(connectors)).await);
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    init_tracing();
    let dist = FakeDistribution::new();
    let (platform, orchestrator) = orchestrator();

    orchestrator
        .start(&dist.config(), ReadinessProbes::always_ready())
        .await
        .unwrap();
    let before = orchestrator.status();
    let calls = platform.calls().len();

    let result = orchestrator
        .start(&dist.config(), ReadinessProbes::always_ready())
        .await;
    assert!(matches!(
        result,
        Err(C8RunError::StateConflict {
            state: OrchestratorState::Running,
            operation: "start"
        })
    ));
    assert_eq!(platform.calls().len(), calls);
    assert_eq!(orchestrator.status().components, before.components);

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_during_startup_cancels() {
    init_tracing();
    let dist = FakeDistribution::new();
    let mut config = dist.config();
    config.readiness.elasticsearch_timeout_secs = 60;
    let (platform, orchestrator) = orchestrator();
    let orchestrator = Arc::new(orchestrator);

    let probes = ReadinessProbes::new(
        Arc::new(FnProbe::new(|| false)),
        Arc::new(AlwaysReady),
        Arc::new(AlwaysReady),
    );
    let starting = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.start(&config, probes).await })
    };

    assert!(
        wait_for(|| !orchestrator.status().components.is_empty()).await,
        "search engine never launched"
    );
    assert_eq!(orchestrator.state(), OrchestratorState::Starting);
    let second = orchestrator
        .start(&dist.config(), ReadinessProbes::always_ready())
        .await;
    assert!(matches!(
        second,
        Err(C8RunError::StateConflict {
            state: OrchestratorState::Starting,
            ..
        })
    ));

    orchestrator.stop().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), starting)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(C8RunError::Cancelled)));
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    assert!(!platform.called("connectors_cmd"));
    assert!(orchestrator.status().components.is_empty());
}

#[tokio::test]
async fn test_disabled_search_engine_is_skipped() {
    init_tracing();
    let dist = FakeDistribution::new();
    let mut config = dist.config();
    config.disable_elasticsearch = true;
    config.check_java_version = false;
    let (platform, orchestrator) = orchestrator();

    orchestrator
        .start(&config, ReadinessProbes::always_ready())
        .await
        .unwrap();
    assert_eq!(platform.calls(), vec!["connectors_cmd", "camunda_cmd"]);
    assert!(
        orchestrator
            .status()
            .component(ComponentKind::SearchEngine)
            .is_none()
    );

    orchestrator.stop().await.unwrap();
}

#[tokio::test]
async fn test_browser_opened_after_startup() {
    init_tracing();
    let dist = FakeDistribution::new();
    let mut config = dist.config();
    config.browser.open = true;
    let (platform, orchestrator) = orchestrator();

    orchestrator
        .start(&config, ReadinessProbes::always_ready())
        .await
        .unwrap();
    assert_eq!(platform.calls().last(), Some(&"open_browser"));

    orchestrator.stop().await.unwrap();
}
