#![cfg(unix)]

mod common;

use c8run_core::{
    C8RunError, ComponentKind, FnProbe, PlatformCapabilities, ProcessStatus, ProcessSupervisor,
    ReadinessGate, TerminationConfig,
};
use c8run_unix::UnixPlatform;
use common::{init_tracing, sh};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn termination(grace_ms: u64, force_ms: u64) -> TerminationConfig {
    TerminationConfig {
        grace_period_ms: grace_ms,
        force_wait_ms: force_ms,
    }
}

fn gate(timeout_ms: u64) -> ReadinessGate {
    ReadinessGate {
        timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_terminate_kills_whole_tree() {
    init_tracing();
    let platform = Arc::new(UnixPlatform::new());
    let supervisor = ProcessSupervisor::new(platform.clone());

    let handle = supervisor
        .launch(ComponentKind::MainRuntime, sh("sleep 60 & sleep 60 & wait"))
        .unwrap();

    let mut tree = platform.process_tree(handle.pid).unwrap();
    for _ in 0..40 {
        if tree.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        tree = platform.process_tree(handle.pid).unwrap();
    }
    assert_eq!(tree.len(), 3);

    supervisor
        .terminate(handle, &termination(2_000, 1_000))
        .await
        .unwrap();

    for pid in tree.descendants() {
        assert!(!platform.is_alive(*pid), "descendant {pid} survived");
    }
    assert!(supervisor.refresh().is_empty());
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::SearchEngine, sh("exec sleep 60"))
        .unwrap();

    let config = termination(2_000, 1_000);
    supervisor.terminate(handle, &config).await.unwrap();
    supervisor.terminate(handle, &config).await.unwrap();
}

#[tokio::test]
async fn test_terminate_after_process_exited() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::ConnectorRuntime, sh("exit 3"))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let view = supervisor.refresh();
    assert_eq!(view[0].status, ProcessStatus::Exited { code: Some(3) });

    supervisor
        .terminate(handle, &termination(2_000, 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unresponsive_process_is_force_killed() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(
            ComponentKind::MainRuntime,
            sh("trap '' TERM; while true; do sleep 1; done"),
        )
        .unwrap();
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    supervisor
        .terminate(handle, &termination(400, 2_000))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_interrupted_terminate_keeps_process_tracked() {
    init_tracing();
    let platform = Arc::new(UnixPlatform::new());
    let supervisor = ProcessSupervisor::new(platform.clone());
    let handle = supervisor
        .launch(
            ComponentKind::SearchEngine,
            sh("trap '' TERM; while true; do sleep 1; done"),
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Dropped while still inside the grace period
    let interrupted = tokio::time::timeout(
        Duration::from_millis(200),
        supervisor.terminate(handle, &termination(5_000, 1_000)),
    )
    .await;
    assert!(interrupted.is_err());
    assert!(platform.is_alive(handle.pid));
    let view = supervisor.refresh();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].pid, handle.pid);

    supervisor
        .terminate_all(&termination(200, 2_000))
        .await
        .unwrap();
    assert!(!platform.is_alive(handle.pid));
    assert!(supervisor.refresh().is_empty());
}

#[tokio::test]
async fn test_terminate_sweeps_children_of_exited_root() {
    init_tracing();
    let platform = Arc::new(UnixPlatform::new());
    let supervisor = ProcessSupervisor::new(platform.clone());
    let dir = tempfile::TempDir::new().unwrap();
    let pidfile = dir.path().join("worker.pid");

    let handle = supervisor
        .launch(
            ComponentKind::ConnectorRuntime,
            sh(&format!(
                "sleep 60 & echo $! > {}; exit 1",
                pidfile.display()
            )),
        )
        .unwrap();
    let result = supervisor
        .wait_ready(
            handle,
            &FnProbe::new(|| false),
            gate(5_000),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(C8RunError::ExitedDuringStartup { .. })));

    let worker = c8run_core::ProcessId(
        std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap(),
    );
    assert!(platform.is_alive(worker));

    supervisor
        .terminate(handle, &termination(2_000, 1_000))
        .await
        .unwrap();
    assert!(!platform.is_alive(worker), "worker {worker} outlived its parent");
    assert!(supervisor.refresh().is_empty());
}

#[tokio::test]
async fn test_duplicate_launch_is_rejected() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let first = supervisor
        .launch(ComponentKind::SearchEngine, sh("exec sleep 60"))
        .unwrap();

    let second = supervisor.launch(ComponentKind::SearchEngine, sh("exec sleep 60"));
    match second {
        Err(C8RunError::AlreadyRunning { component, pid }) => {
            assert_eq!(component, ComponentKind::SearchEngine);
            assert_eq!(pid, first.pid);
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    supervisor
        .terminate_all(&termination(2_000, 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_launch_of_missing_program_fails() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let result = supervisor.launch(
        ComponentKind::SearchEngine,
        c8run_core::CommandSpec::new("/nonexistent/c8run/elasticsearch"),
    );
    assert!(matches!(result, Err(C8RunError::Launch { .. })));
    assert!(supervisor.refresh().is_empty());
}

#[tokio::test]
async fn test_wait_ready_times_out() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::SearchEngine, sh("exec sleep 60"))
        .unwrap();

    let probe = FnProbe::new(|| false);
    let result = supervisor
        .wait_ready(handle, &probe, gate(300), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(C8RunError::Timeout {
            component: ComponentKind::SearchEngine,
            ..
        })
    ));

    supervisor
        .terminate(handle, &termination(2_000, 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_ready_detects_early_exit() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::ConnectorRuntime, sh("exit 1"))
        .unwrap();

    let probe = FnProbe::new(|| false);
    let started = Instant::now();
    let result = supervisor
        .wait_ready(handle, &probe, gate(10_000), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(C8RunError::ExitedDuringStartup {
            component: ComponentKind::ConnectorRuntime,
            ..
        })
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_wait_ready_marks_ready() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::MainRuntime, sh("exec sleep 60"))
        .unwrap();

    let probe = FnProbe::new(|| true);
    supervisor
        .wait_ready(handle, &probe, gate(1_000), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(supervisor.refresh()[0].status, ProcessStatus::Ready);

    supervisor.mark_running();
    assert_eq!(supervisor.refresh()[0].status, ProcessStatus::Running);

    supervisor
        .terminate_all(&termination(2_000, 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_ready_cancelled() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    let handle = supervisor
        .launch(ComponentKind::SearchEngine, sh("exec sleep 60"))
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let probe = FnProbe::new(|| false);
    let result = supervisor
        .wait_ready(handle, &probe, gate(30_000), &cancel)
        .await;
    assert!(matches!(result, Err(C8RunError::Cancelled)));

    supervisor
        .terminate_all(&termination(2_000, 1_000))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_closed_supervisor_refuses_launch() {
    init_tracing();
    let supervisor = ProcessSupervisor::new(Arc::new(UnixPlatform::new()));
    supervisor.close();
    let result = supervisor.launch(ComponentKind::SearchEngine, sh("exec sleep 60"));
    assert!(matches!(result, Err(C8RunError::Cancelled)));
}
