/*!
 * Process Types
 * Resolved process trees and control results
 */

use crate::core::errors::SignalError;
use crate::core::types::{Depth, Pid};
use serde::{Deserialize, Serialize};

/// One process in a resolved tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeNode {
    pub pid: Pid,
    pub depth: Depth,
}

impl TreeNode {
    #[inline]
    #[must_use]
    pub const fn new(pid: Pid, depth: Depth) -> Self {
        Self { pid, depth }
    }
}

/// Snapshot of a process and its descendants
///
/// Nodes are in discovery order: every parent precedes its children and
/// siblings appear in spawn order. An empty tree means the root has exited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTree {
    nodes: Vec<TreeNode>,
}

impl ProcessTree {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from nodes already in discovery order
    #[must_use]
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    #[inline]
    pub fn root(&self) -> Option<Pid> {
        self.nodes.first().map(|node| node.pid)
    }

    #[inline]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// All pids, root included, in discovery order
    pub fn pids(&self) -> Vec<Pid> {
        self.nodes.iter().map(|node| node.pid).collect()
    }

    /// Descendant pids only, in discovery order
    pub fn descendants(&self) -> Vec<Pid> {
        self.nodes.iter().skip(1).map(|node| node.pid).collect()
    }

    /// Suspension order: deepest processes first, root last
    ///
    /// A running parent can hand work to a frozen child, so leaves are frozen
    /// before the processes that feed them.
    pub fn suspend_order(&self) -> Vec<Pid> {
        let mut nodes = self.nodes.clone();
        nodes.reverse();
        nodes.sort_by(|a, b| b.depth.cmp(&a.depth));
        nodes.into_iter().map(|node| node.pid).collect()
    }

    /// Resumption order: root first, then descendants by increasing depth
    pub fn resume_order(&self) -> Vec<Pid> {
        let mut nodes = self.nodes.clone();
        nodes.sort_by_key(|node| node.depth);
        nodes.into_iter().map(|node| node.pid).collect()
    }
}

/// Which control operation produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOp {
    Pause,
    Resume,
    Terminate,
}

impl ControlOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlOp::Pause => "pause",
            ControlOp::Resume => "resume",
            ControlOp::Terminate => "terminate",
        }
    }
}

/// Outcome for one pid touched by a control operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidOutcome {
    pub pid: Pid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<SignalError>,
}

impl PidOutcome {
    #[must_use]
    pub fn ok(pid: Pid) -> Self {
        Self {
            pid,
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(pid: Pid, error: SignalError) -> Self {
        Self {
            pid,
            success: false,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn from_result(pid: Pid, result: Result<(), SignalError>) -> Self {
        match result {
            Ok(()) => Self::ok(pid),
            Err(e) => Self::failed(pid, e),
        }
    }
}

/// Result of a pause, resume or terminate call
///
/// Always returned, never raised: a multi-process job aggregates partial
/// failure from these. `success` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResult {
    pub op: ControlOp,
    pub pid: Pid,
    pub success: bool,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outcomes: Vec<PidOutcome>,
}

/// Result of a pause or resume call
pub type PauseResumeResult = ControlResult;

/// Result of a terminate call
pub type TerminateResult = ControlResult;

impl ControlResult {
    /// Aggregate per-pid outcomes
    #[must_use]
    pub fn from_outcomes(op: ControlOp, pid: Pid, outcomes: Vec<PidOutcome>) -> Self {
        let errors: Vec<String> = outcomes
            .iter()
            .filter_map(|outcome| outcome.error.as_ref().map(ToString::to_string))
            .collect();
        Self {
            op,
            pid,
            success: errors.is_empty(),
            errors,
            outcomes,
        }
    }

    /// Successful result that touched nothing
    #[must_use]
    pub fn noop(op: ControlOp, pid: Pid) -> Self {
        Self::from_outcomes(op, pid, Vec::new())
    }

    /// Failed result that touched nothing
    #[must_use]
    pub fn rejected(op: ControlOp, pid: Pid, reason: impl Into<String>) -> Self {
        Self {
            op,
            pid,
            success: false,
            errors: vec![reason.into()],
            outcomes: Vec::new(),
        }
    }

    /// Fold another result into this one, keeping this result's pid
    pub fn merge(&mut self, other: ControlResult) {
        self.errors.extend(other.errors);
        self.outcomes.extend(other.outcomes);
        self.success = self.errors.is_empty();
    }

    /// First signal error recorded, if any
    pub fn first_error(&self) -> Option<&SignalError> {
        self.outcomes.iter().find_map(|outcome| outcome.error.as_ref())
    }
}
