/*!
 * Job Lifecycle Tests
 * Spawn, pause, resume, terminate and close against real processes
 */

use pipeline_supervisor::{
    ChannelId, JobConfig, JobEvent, JobStatus, ModuleSelection, RunOutcome, Supervisor,
    SupervisorConfig,
};
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

fn supervisor() -> Supervisor {
    Supervisor::builder()
        .with_config(
            SupervisorConfig::default()
                .with_core_budget(4)
                .with_terminate_grace(Duration::from_secs(2))
                .with_terminate_poll(Duration::from_millis(20)),
        )
        .build()
}

async fn next_event(events: &mut Receiver<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event within 10s")
        .expect("channel closed")
}

async fn closed(events: &mut Receiver<JobEvent>) -> JobEvent {
    loop {
        let event = next_event(events).await;
        if matches!(event, JobEvent::Closed { .. }) {
            return event;
        }
    }
}

#[tokio::test]
#[serial]
async fn test_run_to_completion_reports_summary() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor();
    let index = supervisor.registry().add_job_slot().unwrap();
    supervisor.registry().set_core_count(index, 2).unwrap();
    let mut events = supervisor.bridge().subscribe(&supervisor.channel_for(index));

    let config = JobConfig::new(dir.path(), "sh").with_args(["-c", "exit $PIPELINE_WORKER_INDEX"]);
    let pids = supervisor.spawn(index, config).await.unwrap();
    assert_eq!(pids.len(), 2);
    assert_eq!(next_event(&mut events).await, JobEvent::Spawned { pids: pids.clone() });

    match closed(&mut events).await {
        JobEvent::Closed {
            pid,
            exit_code,
            summary,
        } => {
            assert_eq!(pid, pids[0]);
            assert_eq!(exit_code, Some(1));
            assert_eq!(summary.total_steps, 2);
            assert_eq!(summary.incomplete_steps, 1);
            assert_eq!(summary.outcome(), RunOutcome::Warning);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let job = supervisor.registry().job(index).unwrap();
    assert_eq!(job.status, JobStatus::Standby);
    assert!(job.pids.is_empty());
}

#[tokio::test]
#[serial]
async fn test_pause_resume_terminate() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor();
    let index = supervisor.registry().add_job_slot().unwrap();
    let channel: ChannelId = supervisor.channel_for(index);
    let mut events = supervisor.bridge().subscribe(&channel);

    let config = JobConfig::new(dir.path(), "sh").with_args(["-c", "sleep 30 & wait"]);
    let pid = supervisor.spawn(index, config).await.unwrap()[0];
    next_event(&mut events).await;

    // Resume is only valid once paused
    assert!(!supervisor.resume(pid, &channel).await.success);
    next_event(&mut events).await;

    assert!(supervisor.pause(pid, &channel).await.success);
    assert!(matches!(
        next_event(&mut events).await,
        JobEvent::Paused { failed: false, .. }
    ));
    assert_eq!(supervisor.registry().job(index).unwrap().status, JobStatus::Paused);

    assert!(supervisor.resume(pid, &channel).await.success);
    assert!(matches!(
        next_event(&mut events).await,
        JobEvent::Resumed { failed: false, .. }
    ));
    assert_eq!(supervisor.registry().job(index).unwrap().status, JobStatus::Running);

    assert!(supervisor.pause(pid, &channel).await.success);
    assert!(supervisor.terminate(pid, &channel).await.success);
    assert_eq!(supervisor.registry().job(index).unwrap().status, JobStatus::Standby);

    assert!(matches!(closed(&mut events).await, JobEvent::Closed { .. }));
    assert!(supervisor.terminate(pid, &channel).await.success);
}

#[tokio::test]
#[serial]
async fn test_population_job_runs_one_worker() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor();
    let index = supervisor.registry().add_job_slot().unwrap();
    supervisor.registry().set_core_count(index, 3).unwrap();
    supervisor
        .registry()
        .set_module_selection(index, ModuleSelection::Population)
        .unwrap();
    let mut events = supervisor.bridge().subscribe(&supervisor.channel_for(index));

    let pids = supervisor
        .spawn(index, JobConfig::new(dir.path(), "true"))
        .await
        .unwrap();
    assert_eq!(pids.len(), 1);

    match closed(&mut events).await {
        JobEvent::Closed { summary, .. } => assert_eq!(summary.outcome(), RunOutcome::Success),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_root_path_released_after_close() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor();
    let first = supervisor.registry().add_job_slot().unwrap();
    let second = supervisor.registry().add_job_slot().unwrap();
    let mut events = supervisor.bridge().subscribe(&supervisor.channel_for(first));

    supervisor
        .spawn(first, JobConfig::new(dir.path(), "true"))
        .await
        .unwrap();
    closed(&mut events).await;

    let pids = supervisor
        .spawn(second, JobConfig::new(dir.path(), "true"))
        .await
        .unwrap();
    assert_eq!(pids.len(), 1);
}
