/*!
 * Supervisor
 * Job-scoped control surface over the registry, controller and event bridge
 *
 * Every call resolves the job that owns the given pid, validates the job's
 * status, drives the process controller over all workers of the run, emits a
 * result event on the caller's channel and updates the registry.
 */

use crate::bridge::{ChannelId, EventBridge, ExitSummary, JobEvent, WorkerExit};
use crate::core::config::SupervisorConfig;
use crate::core::errors::{ErrorKind, SignalError, SupervisorError, SupervisorResult};
use crate::core::types::{JobIndex, Pid, RunId};
use crate::process::{
    platform_signaler, ControlOp, ControlResult, JobConfig, JobLauncher, LaunchedWorker,
    PlatformSignaler, ProcessController, ProcessTreeResolver, SysinfoTreeResolver,
};
use crate::scheduler::{JobRegistry, JobStatus};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builder for [`Supervisor`]
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<SupervisorConfig>,
    signaler: Option<Arc<dyn PlatformSignaler>>,
    resolver: Option<Arc<dyn ProcessTreeResolver>>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit settings instead of defaults
    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the host platform signaler
    pub fn with_signaler(mut self, signaler: Arc<dyn PlatformSignaler>) -> Self {
        self.signaler = Some(signaler);
        self
    }

    /// Replace the OS process table resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn ProcessTreeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Supervisor {
        let config = self.config.unwrap_or_default();
        let signaler = self.signaler.unwrap_or_else(platform_signaler);
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SysinfoTreeResolver::new()));

        let controller = ProcessController::new(signaler, resolver)
            .with_termination_timing(config.terminate_grace(), config.terminate_poll());

        info!(
            core_budget = config.core_budget,
            grace_ms = config.terminate_grace_ms,
            channel_base = %config.channel_base,
            "Supervisor initialized"
        );

        Supervisor {
            registry: Arc::new(JobRegistry::new(config.core_budget)),
            controller,
            launcher: JobLauncher::new(),
            bridge: EventBridge::new(config.event_capacity),
            channel_base: Arc::from(config.channel_base.as_str()),
        }
    }
}

/// Supervises pipeline jobs
#[derive(Clone)]
pub struct Supervisor {
    registry: Arc<JobRegistry>,
    controller: ProcessController,
    launcher: JobLauncher,
    bridge: EventBridge,
    channel_base: Arc<str>,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    #[inline]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    #[inline]
    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    #[inline]
    pub fn controller(&self) -> &ProcessController {
        &self.controller
    }

    /// Channel the events of job `index` are published on
    pub fn channel_for(&self, index: JobIndex) -> ChannelId {
        ChannelId::for_job(&self.channel_base, index)
    }

    /// Start a run of job `index`
    ///
    /// A dataset root already held by an active job is rejected with a
    /// scheduling conflict before any process is started. A launch failure
    /// returns the job to Standby. Exit of the run is reported later as
    /// process-closed on the job's channel.
    pub async fn spawn(&self, index: JobIndex, config: JobConfig) -> SupervisorResult<Vec<Pid>> {
        let channel = self.channel_for(index);

        let plan = match self.registry.begin_run(index, &config.root_path) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(job = index, error = %e, "Job start rejected");
                let err = SupervisorError::from(e);
                self.publish_error(&channel, None, &err);
                return Err(err);
            }
        };

        let workers = match self
            .launcher
            .launch(index, &config, plan.module, plan.core_count)
            .await
        {
            Ok(workers) => workers,
            Err(e) => {
                self.registry.finish_run(index, plan.run_id);
                self.publish_error(&channel, None, &e);
                return Err(e);
            }
        };

        let run_id = plan.run_id;
        let pids: Vec<Pid> = workers.iter().map(|worker| worker.pid).collect();
        if let Err(e) = self.registry.attach_pids(index, run_id, pids.clone()) {
            warn!(job = index, error = %e, "Run superseded before pids were recorded");
        }

        info!(job = index, run_id, pids = ?pids, "Job spawned");
        self.bridge.publish(&channel, JobEvent::Spawned { pids: pids.clone() });

        tokio::spawn(watch_run(
            Arc::clone(&self.registry),
            self.bridge.clone(),
            channel,
            index,
            run_id,
            workers,
        ));

        Ok(pids)
    }

    /// Suspend the job owning `pid`; only a Running job can be paused
    pub async fn pause(&self, pid: Pid, channel: &ChannelId) -> ControlResult {
        let op = ControlOp::Pause;
        let (index, roots) = match self.job_in_status(pid, JobStatus::Running) {
            Ok(found) => found,
            Err(reason) => {
                let result = ControlResult::rejected(op, pid, reason);
                self.publish_control(channel, &result);
                return result;
            }
        };

        let result = self.apply(op, pid, &roots).await;
        self.settle(index, &result, JobStatus::Paused);
        self.publish_control(channel, &result);
        result
    }

    /// Continue the job owning `pid`; only a Paused job can be resumed
    pub async fn resume(&self, pid: Pid, channel: &ChannelId) -> ControlResult {
        let op = ControlOp::Resume;
        let (index, roots) = match self.job_in_status(pid, JobStatus::Paused) {
            Ok(found) => found,
            Err(reason) => {
                let result = ControlResult::rejected(op, pid, reason);
                self.publish_control(channel, &result);
                return result;
            }
        };

        let result = self.apply(op, pid, &roots).await;
        self.settle(index, &result, JobStatus::Running);
        self.publish_control(channel, &result);
        result
    }

    /// End the job owning `pid`
    ///
    /// A pid with no active job is already terminated: success, no-op.
    pub async fn terminate(&self, pid: Pid, channel: &ChannelId) -> ControlResult {
        let op = ControlOp::Terminate;
        let job = match self.registry.find_by_pid(pid).and_then(|i| self.registry.job(i)) {
            Some(job) if job.is_active() => job,
            _ => {
                debug!(pid, "Terminate on idle pid");
                return ControlResult::noop(op, pid);
            }
        };

        let result = self.apply(op, pid, &job.pids).await;
        if result.success {
            self.registry.finish_run(job.index, job.run_id);
            info!(job = job.index, pid, "Job terminated");
        } else {
            error!(job = job.index, pid, errors = ?result.errors, "Job termination incomplete");
            let kind = result
                .first_error()
                .map(SignalError::kind)
                .unwrap_or(ErrorKind::SignalFailure);
            self.bridge.publish(
                channel,
                JobEvent::Errored {
                    pid: Some(pid),
                    kind,
                    message: result.errors.join("; "),
                },
            );
        }
        result
    }

    /// Run `op` over every worker root of a job, keyed by the requested pid
    async fn apply(&self, op: ControlOp, pid: Pid, roots: &[Pid]) -> ControlResult {
        let mut result = ControlResult::noop(op, pid);
        for &root in roots {
            let part = match op {
                ControlOp::Pause => self.controller.pause(root).await,
                ControlOp::Resume => self.controller.resume(root).await,
                ControlOp::Terminate => self.controller.terminate(root).await,
            };
            result.merge(part);
        }
        result
    }

    fn job_in_status(&self, pid: Pid, required: JobStatus) -> Result<(JobIndex, Vec<Pid>), String> {
        let job = self
            .registry
            .find_by_pid(pid)
            .and_then(|index| self.registry.job(index))
            .ok_or_else(|| format!("No job owns process {}", pid))?;
        if job.status != required {
            return Err(format!(
                "Job {} is {:?}, expected {:?}",
                job.index, job.status, required
            ));
        }
        Ok((job.index, job.pids))
    }

    /// Move the job to `next` when at least one process was acted on
    fn settle(&self, index: JobIndex, result: &ControlResult, next: JobStatus) {
        if !result.outcomes.iter().any(|outcome| outcome.success) {
            return;
        }
        if let Err(e) = self.registry.set_status(index, next) {
            warn!(job = index, error = %e, "Status update skipped");
        }
    }

    fn publish_control(&self, channel: &ChannelId, result: &ControlResult) {
        let failed = !result.success;
        let message = if failed {
            format!("{} failed: {}", result.op.as_str(), result.errors.join("; "))
        } else {
            format!("{} applied to {} processes", result.op.as_str(), result.outcomes.len())
        };
        let event = match result.op {
            ControlOp::Pause => JobEvent::Paused { message, failed },
            _ => JobEvent::Resumed { message, failed },
        };
        self.bridge.publish(channel, event);

        if let Some(e @ SignalError::PlatformUnavailable(_)) = result.first_error() {
            self.bridge.publish(
                channel,
                JobEvent::Errored {
                    pid: Some(result.pid),
                    kind: e.kind(),
                    message: e.to_string(),
                },
            );
        }
    }

    fn publish_error(&self, channel: &ChannelId, pid: Option<Pid>, err: &SupervisorError) {
        self.bridge.publish(
            channel,
            JobEvent::Errored {
                pid,
                kind: err.kind(),
                message: err.to_string(),
            },
        );
    }
}

/// Wait for every worker of a run, then report and release the job
async fn watch_run(
    registry: Arc<JobRegistry>,
    bridge: EventBridge,
    channel: ChannelId,
    index: JobIndex,
    run_id: RunId,
    workers: Vec<LaunchedWorker>,
) {
    let primary = workers.first().map(|worker| worker.pid).unwrap_or_default();

    let exits = join_all(workers.into_iter().map(|mut worker| async move {
        let exit_code = match worker.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(pid = worker.pid, error = %e, "Failed to reap worker");
                None
            }
        };
        debug!(pid = worker.pid, ?exit_code, "Worker exited");
        WorkerExit {
            pid: worker.pid,
            exit_code,
        }
    }))
    .await;

    let summary = ExitSummary::from_exits(exits);
    let released = registry.finish_run(index, run_id);
    info!(
        job = index,
        run_id,
        released,
        outcome = ?summary.outcome(),
        incomplete = summary.incomplete_steps,
        total = summary.total_steps,
        "Job run closed"
    );

    bridge.publish(
        &channel,
        JobEvent::Closed {
            pid: primary,
            exit_code: summary.worst_exit_code(),
            summary,
        },
    );
}
