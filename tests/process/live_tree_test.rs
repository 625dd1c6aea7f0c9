/*!
 * Live Process Tree Tests
 * Real process groups driven through the POSIX signaler
 */

use pipeline_supervisor::process::{
    platform_signaler, JobConfig, JobLauncher, LaunchedWorker, PlatformSignaler,
    ProcessController, ProcessTreeResolver, SysinfoTreeResolver,
};
use pipeline_supervisor::ModuleSelection;
use serial_test::serial;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Shell with two sleeping children, all in one fresh process group
async fn spawn_tree(dir: &TempDir) -> LaunchedWorker {
    let config = JobConfig::new(dir.path(), "sh").with_args(["-c", "sleep 30 & sleep 30 & wait"]);
    let mut workers = JobLauncher::new()
        .launch(0, &config, ModuleSelection::Participant, 1)
        .await
        .unwrap();
    // Let the shell fork its children
    tokio::time::sleep(Duration::from_millis(300)).await;
    workers.remove(0)
}

fn membership(resolver: &SysinfoTreeResolver, root: u32) -> BTreeSet<u32> {
    resolver.resolve(root).pids().into_iter().collect()
}

fn controller(signaler: Arc<dyn PlatformSignaler>) -> ProcessController {
    ProcessController::new(signaler, Arc::new(SysinfoTreeResolver::new()))
        .with_termination_timing(Duration::from_secs(2), Duration::from_millis(20))
}

#[tokio::test]
#[serial]
async fn test_pause_resume_cycles_keep_tree() {
    let dir = TempDir::new().unwrap();
    let mut worker = spawn_tree(&dir).await;
    let signaler = platform_signaler();
    let controller = controller(signaler.clone());
    let resolver = SysinfoTreeResolver::new();

    let before = membership(&resolver, worker.pid);
    assert!(before.len() >= 3, "tree not formed: {:?}", before);

    for _ in 0..5 {
        assert!(controller.pause(worker.pid).await.success);
        assert!(controller.resume(worker.pid).await.success);
    }

    assert!(signaler.is_alive(worker.pid));
    assert_eq!(membership(&resolver, worker.pid), before);

    assert!(controller.terminate(worker.pid).await.success);
    worker.child.wait().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_terminate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut worker = spawn_tree(&dir).await;
    let signaler = platform_signaler();
    let controller = controller(signaler.clone());

    assert!(controller.terminate(worker.pid).await.success);
    assert!(!signaler.is_alive(worker.pid));
    assert!(controller.terminate(worker.pid).await.success);

    worker.child.wait().await.unwrap();
    assert!(controller.terminate(worker.pid).await.success);
}

#[tokio::test]
#[serial]
async fn test_terminate_paused_tree() {
    let dir = TempDir::new().unwrap();
    let mut worker = spawn_tree(&dir).await;
    let controller = controller(platform_signaler());

    assert!(controller.pause(worker.pid).await.success);
    let result = controller.terminate(worker.pid).await;
    assert!(result.success, "{:?}", result.errors);

    let status = tokio::time::timeout(Duration::from_secs(5), worker.child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!status.success());
}

#[tokio::test]
#[serial]
async fn test_pause_exited_process_is_stale() {
    let dir = TempDir::new().unwrap();
    let config = JobConfig::new(dir.path(), "true");
    let mut worker = JobLauncher::new()
        .launch(0, &config, ModuleSelection::Participant, 1)
        .await
        .unwrap()
        .remove(0);
    worker.child.wait().await.unwrap();

    let result = controller(platform_signaler()).pause(worker.pid).await;
    assert!(!result.success);
}

#[tokio::test]
#[serial]
async fn test_terminate_kills_member_ignoring_sigterm() {
    let dir = TempDir::new().unwrap();
    let config = JobConfig::new(dir.path(), "sh").with_args([
        "-c",
        "(trap '' TERM; exec sleep 60) & echo $! > member.pid; wait",
    ]);
    let mut worker = JobLauncher::new()
        .launch(0, &config, ModuleSelection::Participant, 1)
        .await
        .unwrap()
        .remove(0);

    let pid_file = dir.path().join("member.pid");
    let mut member = None;
    for _ in 0..100 {
        if let Ok(raw) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = raw.trim().parse::<u32>() {
                member = Some(pid);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let member = member.expect("member pid not written");
    // Let the member install its ignore disposition
    tokio::time::sleep(Duration::from_millis(300)).await;

    let signaler = platform_signaler();
    let controller = ProcessController::new(signaler.clone(), Arc::new(SysinfoTreeResolver::new()))
        .with_termination_timing(Duration::from_millis(500), Duration::from_millis(20));

    let result = controller.terminate(worker.pid).await;
    assert!(result.success, "{:?}", result.errors);

    tokio::time::timeout(Duration::from_secs(5), worker.child.wait())
        .await
        .unwrap()
        .unwrap();
    for _ in 0..100 {
        if !signaler.is_alive(member) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!signaler.is_alive(member), "member {} survived terminate", member);
    assert!(!signaler.group_alive(worker.pid));
}
