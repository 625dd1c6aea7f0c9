/*!
 * Job Registry
 * Job slots, per-job pids and the shared core budget
 *
 * The registry is the only owner of process ids: a pid exists in the
 * supervisor only as a member of some job's `pids`. All budget mutations go
 * through the single write lock, so `used_cores() <= physical_core_budget()`
 * holds after every call.
 */

use super::types::{Job, JobStatus, ModuleSelection, RunPlan};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::{DEFAULT_JOB_CORES, MIN_CORE_BUDGET};
use crate::core::types::{CoreCount, JobIndex, Pid, RunId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryState {
    jobs: BTreeMap<JobIndex, Job>,
    next_index: JobIndex,
    next_run: RunId,
}

impl RegistryState {
    fn job(&self, index: JobIndex) -> SchedulerResult<&Job> {
        self.jobs
            .get(&index)
            .ok_or(SchedulerError::JobNotFound(index))
    }

    fn job_mut(&mut self, index: JobIndex) -> SchedulerResult<&mut Job> {
        self.jobs
            .get_mut(&index)
            .ok_or(SchedulerError::JobNotFound(index))
    }

    fn used_cores(&self) -> CoreCount {
        self.jobs.values().map(|job| job.core_count).sum()
    }

    fn holder_of(&self, path: &Path) -> Option<JobIndex> {
        self.jobs
            .values()
            .find(|job| job.is_active() && job.root_path.as_deref() == Some(path))
            .map(|job| job.index)
    }
}

/// Job registry and core-budget scheduler
#[derive(Debug)]
pub struct JobRegistry {
    state: RwLock<RegistryState>,
    budget: CoreCount,
}

impl JobRegistry {
    /// Create a registry with a fixed physical core budget
    pub fn new(physical_core_budget: CoreCount) -> Self {
        let budget = physical_core_budget.max(MIN_CORE_BUDGET);
        info!(budget, "Job registry initialized");
        Self {
            state: RwLock::new(RegistryState::default()),
            budget,
        }
    }

    #[inline]
    pub fn physical_core_budget(&self) -> CoreCount {
        self.budget
    }

    /// Cores allocated across all job slots
    pub fn used_cores(&self) -> CoreCount {
        self.state.read().used_cores()
    }

    pub fn free_cores(&self) -> CoreCount {
        self.budget.saturating_sub(self.used_cores())
    }

    /// Add a Standby job slot with the default core count
    pub fn add_job_slot(&self) -> SchedulerResult<JobIndex> {
        let mut state = self.state.write();
        let used = state.used_cores();
        if used + DEFAULT_JOB_CORES > self.budget {
            return Err(SchedulerError::CoreBudgetExceeded {
                requested: DEFAULT_JOB_CORES,
                available: self.budget.saturating_sub(used),
                budget: self.budget,
            });
        }

        let index = state.next_index;
        state.next_index += 1;
        state.jobs.insert(index, Job::new(index));
        debug!(job = index, "Job slot added");
        Ok(index)
    }

    /// Remove a job slot; active jobs must be terminated first
    pub fn remove_job_slot(&self, index: JobIndex) -> SchedulerResult<Job> {
        let mut state = self.state.write();
        if state.job(index)?.is_active() {
            return Err(SchedulerError::JobActive(index));
        }
        let job = state
            .jobs
            .remove(&index)
            .ok_or(SchedulerError::JobNotFound(index))?;
        debug!(job = index, "Job slot removed");
        Ok(job)
    }

    /// Change a Standby job's core count within the budget and module limits
    pub fn set_core_count(&self, index: JobIndex, cores: CoreCount) -> SchedulerResult<()> {
        if cores == 0 {
            return Err(SchedulerError::InvalidCoreCount(cores));
        }

        let mut state = self.state.write();
        let job = state.job(index)?;
        if job.is_active() {
            return Err(SchedulerError::JobActive(index));
        }
        if let Some(max) = job.module.max_cores() {
            if cores > max {
                return Err(SchedulerError::SingleCoreModule {
                    module: job.module,
                    requested: cores,
                });
            }
        }

        let others = state.used_cores() - job.core_count;
        if others + cores > self.budget {
            return Err(SchedulerError::CoreBudgetExceeded {
                requested: cores,
                available: self.budget.saturating_sub(others),
                budget: self.budget,
            });
        }

        state.job_mut(index)?.core_count = cores;
        debug!(job = index, cores, "Core count updated");
        Ok(())
    }

    /// Change a Standby job's module; single-core modules clamp the core count
    ///
    /// Returns the resulting core count.
    pub fn set_module_selection(
        &self,
        index: JobIndex,
        module: ModuleSelection,
    ) -> SchedulerResult<CoreCount> {
        let mut state = self.state.write();
        let job = state.job_mut(index)?;
        if job.is_active() {
            return Err(SchedulerError::JobActive(index));
        }

        job.module = module;
        if let Some(max) = module.max_cores() {
            job.core_count = job.core_count.min(max);
        }
        debug!(job = index, %module, cores = job.core_count, "Module selection updated");
        Ok(job.core_count)
    }

    /// Set the dataset root of a Standby job
    pub fn set_root_path(&self, index: JobIndex, path: impl AsRef<Path>) -> SchedulerResult<()> {
        let mut state = self.state.write();
        let job = state.job_mut(index)?;
        if job.is_active() {
            return Err(SchedulerError::JobActive(index));
        }
        job.root_path = Some(normalize_root(path.as_ref()));
        Ok(())
    }

    /// Apply a validated status transition, returning the previous status
    ///
    /// Moving to Standby clears the job's pids. Activating a Standby job is
    /// rejected while another active job holds its dataset root.
    pub fn set_status(&self, index: JobIndex, status: JobStatus) -> SchedulerResult<JobStatus> {
        let mut state = self.state.write();
        let job = state.job(index)?;
        let from = job.status;
        if !from.can_transition_to(status) {
            return Err(SchedulerError::InvalidTransition {
                index,
                from,
                to: status,
            });
        }

        if from == JobStatus::Standby && status.is_active() {
            if let Some(path) = job.root_path.clone() {
                if let Some(holder) = state.holder_of(&path) {
                    return Err(SchedulerError::DuplicateRootPath {
                        path: path.display().to_string(),
                        holder,
                    });
                }
            }
        }

        let job = state.job_mut(index)?;
        job.status = status;
        if status == JobStatus::Standby {
            job.pids.clear();
        }
        if from != status {
            debug!(job = index, ?from, to = ?status, "Job status changed");
        }
        Ok(from)
    }

    /// Whether another active job already operates on this dataset root
    pub fn is_duplicate_root_path(&self, path: impl AsRef<Path>) -> bool {
        self.holder_of(path).is_some()
    }

    /// Active job holding this dataset root, if any
    pub fn holder_of(&self, path: impl AsRef<Path>) -> Option<JobIndex> {
        let path = normalize_root(path.as_ref());
        self.state.read().holder_of(&path)
    }

    /// Reserve a job for a new run
    ///
    /// Checks the duplicate-root invariant and moves the job to Running in one
    /// critical section, so two concurrent starts on the same dataset cannot
    /// both pass. The returned plan carries the core count and module as
    /// they were when the job was reserved. Pids are attached afterwards with
    /// [`attach_pids`].
    ///
    /// [`attach_pids`]: JobRegistry::attach_pids
    pub fn begin_run(&self, index: JobIndex, root_path: impl AsRef<Path>) -> SchedulerResult<RunPlan> {
        let path = normalize_root(root_path.as_ref());
        let mut state = self.state.write();

        if state.job(index)?.is_active() {
            return Err(SchedulerError::JobActive(index));
        }
        if let Some(holder) = state.holder_of(&path) {
            return Err(SchedulerError::DuplicateRootPath {
                path: path.display().to_string(),
                holder,
            });
        }

        state.next_run += 1;
        let run_id = state.next_run;
        let job = state.job_mut(index)?;
        job.root_path = Some(path);
        job.status = JobStatus::Running;
        job.pids.clear();
        job.run_id = run_id;
        Ok(RunPlan {
            run_id,
            core_count: job.core_count,
            module: job.module,
        })
    }

    /// Record the worker pids of a run that is still current
    pub fn attach_pids(&self, index: JobIndex, run_id: RunId, pids: Vec<Pid>) -> SchedulerResult<()> {
        let mut state = self.state.write();
        let job = state.job_mut(index)?;
        if job.run_id != run_id || !job.is_active() {
            return Err(SchedulerError::InvalidTransition {
                index,
                from: job.status,
                to: JobStatus::Running,
            });
        }
        job.pids = pids;
        Ok(())
    }

    /// Return a run's job to Standby if that run is still the current one
    ///
    /// Returns true when the job was reset.
    pub fn finish_run(&self, index: JobIndex, run_id: RunId) -> bool {
        let mut state = self.state.write();
        match state.jobs.get_mut(&index) {
            Some(job) if job.run_id == run_id && job.is_active() => {
                job.status = JobStatus::Standby;
                job.pids.clear();
                true
            }
            _ => false,
        }
    }

    /// Force a job back to Standby with no pids
    pub fn reset(&self, index: JobIndex) -> SchedulerResult<()> {
        let mut state = self.state.write();
        let job = state.job_mut(index)?;
        job.status = JobStatus::Standby;
        job.pids.clear();
        Ok(())
    }

    /// Job owning this pid
    pub fn find_by_pid(&self, pid: Pid) -> Option<JobIndex> {
        self.state
            .read()
            .jobs
            .values()
            .find(|job| job.owns(pid))
            .map(|job| job.index)
    }

    pub fn job(&self, index: JobIndex) -> Option<Job> {
        self.state.read().jobs.get(&index).cloned()
    }

    /// Snapshot of all job slots in index order
    pub fn jobs(&self) -> Vec<Job> {
        self.state.read().jobs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().jobs.is_empty()
    }
}

fn normalize_root(path: &Path) -> PathBuf {
    path_clean::clean(path)
}
