/*!
 * Job Registry Tests
 * Core budget, single-core modules, root path exclusivity and slot lifecycle
 */

use pipeline_supervisor::{ErrorKind, JobRegistry, JobStatus, ModuleSelection, SchedulerError};
use pretty_assertions::assert_eq;

fn registry_with_jobs(budget: usize, cores: &[usize]) -> (JobRegistry, Vec<usize>) {
    let registry = JobRegistry::new(budget);
    let indices = cores
        .iter()
        .map(|&n| {
            let index = registry.add_job_slot().unwrap();
            registry.set_core_count(index, n).unwrap();
            index
        })
        .collect();
    (registry, indices)
}

#[test]
fn test_budget_rejects_increase_and_keeps_previous_value() {
    let (registry, jobs) = registry_with_jobs(4, &[2, 2]);

    let err = registry.set_core_count(jobs[0], 3).unwrap_err();
    assert_eq!(
        err,
        SchedulerError::CoreBudgetExceeded {
            requested: 3,
            available: 2,
            budget: 4,
        }
    );
    assert_eq!(err.kind(), ErrorKind::SchedulingConflict);
    assert_eq!(registry.job(jobs[0]).unwrap().core_count, 2);
    assert_eq!(registry.used_cores(), 4);
    assert_eq!(registry.free_cores(), 0);
}

#[test]
fn test_full_budget_blocks_new_slots() {
    let (registry, _) = registry_with_jobs(2, &[2]);
    assert!(matches!(
        registry.add_job_slot(),
        Err(SchedulerError::CoreBudgetExceeded { .. })
    ));
}

#[test]
fn test_lowering_core_count_frees_budget() {
    let (registry, jobs) = registry_with_jobs(4, &[3]);
    registry.set_core_count(jobs[0], 1).unwrap();
    assert_eq!(registry.free_cores(), 3);
}

#[test]
fn test_population_is_single_core() {
    let (registry, jobs) = registry_with_jobs(8, &[1]);
    let job = jobs[0];
    registry
        .set_module_selection(job, ModuleSelection::Population)
        .unwrap();

    let err = registry.set_core_count(job, 2).unwrap_err();
    assert_eq!(
        err,
        SchedulerError::SingleCoreModule {
            module: ModuleSelection::Population,
            requested: 2,
        }
    );
    assert_eq!(registry.job(job).unwrap().core_count, 1);
}

#[test]
fn test_switching_to_population_clamps_cores() {
    let (registry, jobs) = registry_with_jobs(8, &[4]);
    let cores = registry
        .set_module_selection(jobs[0], ModuleSelection::Population)
        .unwrap();
    assert_eq!(cores, 1);
    assert_eq!(registry.used_cores(), 1);
}

#[test]
fn test_zero_cores_rejected() {
    let (registry, jobs) = registry_with_jobs(4, &[1]);
    assert_eq!(
        registry.set_core_count(jobs[0], 0),
        Err(SchedulerError::InvalidCoreCount(0))
    );
}

#[test]
fn test_active_job_cannot_be_removed_or_resized() {
    let (registry, jobs) = registry_with_jobs(4, &[1]);
    let dir = tempfile::tempdir().unwrap();
    registry.begin_run(jobs[0], dir.path()).unwrap();

    assert_eq!(
        registry.remove_job_slot(jobs[0]).unwrap_err(),
        SchedulerError::JobActive(jobs[0])
    );
    assert_eq!(
        registry.set_core_count(jobs[0], 2),
        Err(SchedulerError::JobActive(jobs[0]))
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_standby_job_can_be_removed() {
    let (registry, jobs) = registry_with_jobs(4, &[2]);
    let removed = registry.remove_job_slot(jobs[0]).unwrap();
    assert_eq!(removed.core_count, 2);
    assert!(registry.is_empty());
    assert_eq!(registry.free_cores(), 4);
}

#[test]
fn test_duplicate_root_path_only_among_active_jobs() {
    let (registry, jobs) = registry_with_jobs(4, &[1, 1]);
    let dir = tempfile::tempdir().unwrap();

    registry.set_root_path(jobs[1], dir.path()).unwrap();
    assert!(!registry.is_duplicate_root_path(dir.path()));

    registry.begin_run(jobs[0], dir.path()).unwrap();
    assert!(registry.is_duplicate_root_path(dir.path()));
    assert!(registry.is_duplicate_root_path(dir.path().join(".")));

    let err = registry.begin_run(jobs[1], dir.path()).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::DuplicateRootPath { holder, .. } if holder == jobs[0]
    ));
    assert_eq!(registry.job(jobs[1]).unwrap().status, JobStatus::Standby);
}

#[test]
fn test_finished_run_releases_root_path() {
    let (registry, jobs) = registry_with_jobs(4, &[1, 1]);
    let dir = tempfile::tempdir().unwrap();

    let run = registry.begin_run(jobs[0], dir.path()).unwrap().run_id;
    registry.attach_pids(jobs[0], run, vec![4242]).unwrap();
    assert_eq!(registry.find_by_pid(4242), Some(jobs[0]));

    assert!(registry.finish_run(jobs[0], run));
    let job = registry.job(jobs[0]).unwrap();
    assert_eq!(job.status, JobStatus::Standby);
    assert!(job.pids.is_empty());
    assert_eq!(registry.find_by_pid(4242), None);

    registry.begin_run(jobs[1], dir.path()).unwrap();
}

#[test]
fn test_stale_run_does_not_reset_newer_run() {
    let (registry, jobs) = registry_with_jobs(4, &[1]);
    let dir = tempfile::tempdir().unwrap();

    let first = registry.begin_run(jobs[0], dir.path()).unwrap().run_id;
    registry.reset(jobs[0]).unwrap();
    let second = registry.begin_run(jobs[0], dir.path()).unwrap().run_id;

    assert!(!registry.finish_run(jobs[0], first));
    assert_eq!(registry.job(jobs[0]).unwrap().status, JobStatus::Running);
    assert!(registry.finish_run(jobs[0], second));
}

#[test]
fn test_status_transitions_are_validated() {
    let (registry, jobs) = registry_with_jobs(4, &[1]);
    assert!(matches!(
        registry.set_status(jobs[0], JobStatus::Paused),
        Err(SchedulerError::InvalidTransition { .. })
    ));
    assert_eq!(
        registry.set_status(jobs[0], JobStatus::Running),
        Ok(JobStatus::Standby)
    );
    assert_eq!(
        registry.set_status(jobs[0], JobStatus::Paused),
        Ok(JobStatus::Running)
    );
    assert_eq!(
        registry.set_status(jobs[0], JobStatus::Standby),
        Ok(JobStatus::Paused)
    );
}

#[test]
fn test_activation_rejected_while_root_is_held() {
    let (registry, jobs) = registry_with_jobs(4, &[1, 1]);
    let dir = tempfile::tempdir().unwrap();
    registry.begin_run(jobs[0], dir.path()).unwrap();
    registry.set_root_path(jobs[1], dir.path()).unwrap();

    let err = registry.set_status(jobs[1], JobStatus::Running).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::DuplicateRootPath { holder, .. } if holder == jobs[0]
    ));
    assert_eq!(err.kind(), ErrorKind::SchedulingConflict);
    assert_eq!(registry.job(jobs[1]).unwrap().status, JobStatus::Standby);

    registry.reset(jobs[0]).unwrap();
    assert_eq!(
        registry.set_status(jobs[1], JobStatus::Running),
        Ok(JobStatus::Standby)
    );
}

#[test]
fn test_active_job_keeps_module_selection() {
    let (registry, jobs) = registry_with_jobs(4, &[3]);
    let dir = tempfile::tempdir().unwrap();
    registry.begin_run(jobs[0], dir.path()).unwrap();

    assert_eq!(
        registry.set_module_selection(jobs[0], ModuleSelection::Population),
        Err(SchedulerError::JobActive(jobs[0]))
    );
    let job = registry.job(jobs[0]).unwrap();
    assert_eq!(job.module, ModuleSelection::Participant);
    assert_eq!(job.core_count, 3);
}
