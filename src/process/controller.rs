/*!
 * Process Controller
 * Pause, resume and terminate for whole process trees
 *
 * Combines a `PlatformSignaler` with a `ProcessTreeResolver`:
 * - group-propagating signalers get a single call on the root
 * - per-process signalers get one call per tree member, deepest-first for
 *   suspension and root-first for resumption
 *
 * Every call returns a `ControlResult`; nothing is raised past this layer.
 */

use super::signaler::PlatformSignaler;
use super::tree::ProcessTreeResolver;
use super::types::{ControlOp, ControlResult, PidOutcome, ProcessTree, TreeNode};
use crate::core::errors::SignalError;
use crate::core::limits::{DEFAULT_TERMINATE_GRACE, DEFAULT_TERMINATE_POLL};
use crate::core::types::Pid;
use crate::monitoring::{control_span, record_control_result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

/// Tree-aware process control
#[derive(Clone)]
pub struct ProcessController {
    signaler: Arc<dyn PlatformSignaler>,
    resolver: Arc<dyn ProcessTreeResolver>,
    grace: Duration,
    poll: Duration,
}

impl ProcessController {
    pub fn new(signaler: Arc<dyn PlatformSignaler>, resolver: Arc<dyn ProcessTreeResolver>) -> Self {
        info!(
            signaler = ?signaler.kind(),
            group = signaler.propagates_to_group(),
            "Process controller initialized"
        );
        Self {
            signaler,
            resolver,
            grace: DEFAULT_TERMINATE_GRACE,
            poll: DEFAULT_TERMINATE_POLL,
        }
    }

    /// Set the graceful-terminate wait and its liveness poll interval
    #[must_use]
    pub fn with_termination_timing(mut self, grace: Duration, poll: Duration) -> Self {
        self.grace = grace;
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    #[inline]
    pub fn signaler(&self) -> &Arc<dyn PlatformSignaler> {
        &self.signaler
    }

    #[inline]
    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Suspend `root` and its descendants
    pub async fn pause(&self, root: Pid) -> ControlResult {
        let span = control_span(ControlOp::Pause.as_str(), root);
        async {
            let result = self.apply(ControlOp::Pause, root).await;
            finish(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// Resume `root` and its descendants
    pub async fn resume(&self, root: Pid) -> ControlResult {
        let span = control_span(ControlOp::Resume.as_str(), root);
        async {
            let result = self.apply(ControlOp::Resume, root).await;
            finish(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// End `root` and its descendants
    ///
    /// Resumes first, sends the graceful request, waits up to the grace
    /// period and escalates to a forceful kill for survivors. With a group
    /// signaler the group counts as alive while any member runs, even after
    /// the root has exited. Nothing left running is a success.
    pub async fn terminate(&self, root: Pid) -> ControlResult {
        let span = control_span(ControlOp::Terminate.as_str(), root);
        async {
            let result = self.terminate_tree(root).await;
            finish(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, op: ControlOp, root: Pid) -> ControlResult {
        if let Err(e) = self.signaler.suspension_available() {
            return ControlResult::from_outcomes(op, root, vec![PidOutcome::failed(root, e)]);
        }

        let order = if self.signaler.propagates_to_group() {
            vec![root]
        } else {
            let tree = self.resolve(root).await;
            if tree.is_empty() {
                return ControlResult::from_outcomes(
                    op,
                    root,
                    vec![PidOutcome::failed(root, SignalError::StaleProcess(root))],
                );
            }
            match op {
                ControlOp::Pause => tree.suspend_order(),
                _ => tree.resume_order(),
            }
        };

        let outcomes = order
            .into_iter()
            .map(|pid| {
                let result = match op {
                    ControlOp::Pause => self.signaler.suspend(pid),
                    _ => self.signaler.resume(pid),
                };
                PidOutcome::from_result(pid, result)
            })
            .collect();

        ControlResult::from_outcomes(op, root, outcomes)
    }

    async fn terminate_tree(&self, root: Pid) -> ControlResult {
        let op = ControlOp::Terminate;
        if !self.running(root) {
            debug!(pid = root, "Already exited");
            return ControlResult::from_outcomes(op, root, vec![PidOutcome::ok(root)]);
        }

        let tree = if self.signaler.propagates_to_group() {
            ProcessTree::from_nodes(vec![TreeNode::new(root, 0)])
        } else {
            self.resolve(root).await
        };
        if tree.is_empty() {
            return ControlResult::from_outcomes(op, root, vec![PidOutcome::ok(root)]);
        }

        // Frozen processes cannot act on a termination request
        if self.signaler.suspension_available().is_ok() {
            for pid in tree.resume_order() {
                match self.signaler.resume(pid) {
                    Ok(()) | Err(SignalError::StaleProcess(_)) => {}
                    Err(e) => warn!(pid, error = %e, "Resume before terminate failed"),
                }
            }
        }

        let targets = tree.suspend_order();
        for &pid in &targets {
            match self.graceful(pid).await {
                Ok(()) | Err(SignalError::StaleProcess(_)) => {}
                Err(e) => warn!(pid, error = %e, "Graceful terminate failed, will escalate"),
            }
        }

        let survivors = self.wait_for_exit(&targets).await;

        let outcomes = targets
            .iter()
            .map(|&pid| {
                if !survivors.contains(&pid) {
                    return PidOutcome::ok(pid);
                }
                warn!(pid, grace_ms = self.grace.as_millis() as u64, "Escalating to kill");
                match self.signaler.kill(pid) {
                    Ok(()) | Err(SignalError::StaleProcess(_)) => PidOutcome::ok(pid),
                    Err(e) => PidOutcome::failed(pid, e),
                }
            })
            .collect();

        ControlResult::from_outcomes(op, root, outcomes)
    }

    /// Graceful terminate off the async executor (Windows shells out)
    async fn graceful(&self, pid: Pid) -> Result<(), SignalError> {
        let signaler = Arc::clone(&self.signaler);
        tokio::task::spawn_blocking(move || signaler.terminate(pid))
            .await
            .unwrap_or_else(|e| Err(SignalError::failure(pid, e)))
    }

    /// Poll until every pid has exited or the grace period elapses
    ///
    /// Returns the pids still alive at the deadline.
    async fn wait_for_exit(&self, pids: &[Pid]) -> Vec<Pid> {
        let deadline = Instant::now() + self.grace;
        loop {
            let alive: Vec<Pid> = pids
                .iter()
                .copied()
                .filter(|&pid| self.running(pid))
                .collect();
            if alive.is_empty() || Instant::now() >= deadline {
                return alive;
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    /// Liveness of everything a signal to `pid` reaches
    fn running(&self, pid: Pid) -> bool {
        if self.signaler.propagates_to_group() {
            self.signaler.group_alive(pid)
        } else {
            self.signaler.is_alive(pid)
        }
    }

    async fn resolve(&self, root: Pid) -> ProcessTree {
        let resolver = Arc::clone(&self.resolver);
        match tokio::task::spawn_blocking(move || resolver.resolve(root)).await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(pid = root, error = %e, "Process table query failed");
                ProcessTree::empty()
            }
        }
    }
}

fn finish(result: &ControlResult) {
    record_control_result(&Span::current(), result.outcomes.len(), result.success);
    if result.success {
        debug!(op = result.op.as_str(), pid = result.pid, "Control operation succeeded");
    } else {
        warn!(
            op = result.op.as_str(),
            pid = result.pid,
            errors = ?result.errors,
            "Control operation failed"
        );
    }
}
