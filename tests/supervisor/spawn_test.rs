/*!
 * Spawn Tests
 * Rejections that must happen before any process is started
 */

use pipeline_supervisor::{
    ErrorKind, JobConfig, JobEvent, JobStatus, SchedulerError, Supervisor, SupervisorConfig,
    SupervisorError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn supervisor(budget: usize) -> Supervisor {
    Supervisor::builder()
        .with_config(SupervisorConfig::default().with_core_budget(budget))
        .build()
}

#[tokio::test]
async fn test_spawn_on_active_root_is_conflict() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(4);
    let holder = assert_ok!(supervisor.registry().add_job_slot());
    let blocked = assert_ok!(supervisor.registry().add_job_slot());
    assert_ok!(supervisor.registry().begin_run(holder, dir.path()));

    let mut events = supervisor.bridge().subscribe(&supervisor.channel_for(blocked));
    // Would fail to launch if it got that far
    let config = JobConfig::new(dir.path(), "no-such-pipeline-binary");
    let err = assert_err!(supervisor.spawn(blocked, config).await);

    assert_eq!(err.kind(), ErrorKind::SchedulingConflict);
    assert!(matches!(
        err,
        SupervisorError::Scheduling(SchedulerError::DuplicateRootPath { holder: h, .. }) if h == holder
    ));

    let job = supervisor.registry().job(blocked).unwrap();
    assert_eq!(job.status, JobStatus::Standby);
    assert!(job.pids.is_empty());

    match events.recv().await.unwrap() {
        JobEvent::Errored { pid, kind, .. } => {
            assert_eq!(pid, None);
            assert_eq!(kind, ErrorKind::SchedulingConflict);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_spawn_with_missing_root_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(2);
    let index = supervisor.registry().add_job_slot().unwrap();

    let config = JobConfig::new(dir.path().join("missing"), "true");
    let err = assert_err!(supervisor.spawn(index, config).await);

    assert_eq!(err.kind(), ErrorKind::SpawnFailure);
    let job = supervisor.registry().job(index).unwrap();
    assert_eq!(job.status, JobStatus::Standby);
    assert!(!supervisor.registry().is_duplicate_root_path(dir.path().join("missing")));
}

#[tokio::test]
async fn test_control_of_unknown_pid() {
    let supervisor = supervisor(2);
    let channel = supervisor.channel_for(0);

    assert!(!supervisor.pause(3_999_999, &channel).await.success);
    assert!(!supervisor.resume(3_999_999, &channel).await.success);
    assert!(supervisor.terminate(3_999_999, &channel).await.success);
}
