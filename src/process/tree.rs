/*!
 * Process Tree Resolution
 * Enumerates the live descendants of a root process from the OS process table
 *
 * Trees are never cached: the pipeline spawns helpers long after its root
 * starts, so every control call re-reads the table.
 */

use super::types::{ProcessTree, TreeNode};
use crate::core::types::Pid;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;

/// Process tree query interface
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTreeResolver: Send + Sync {
    /// Resolve `root` and all its current descendants
    ///
    /// Returns an empty tree when `root` no longer exists.
    fn resolve(&self, root: Pid) -> ProcessTree;

    /// Descendant pids of `root` in breadth-first spawn order
    fn resolve_descendants(&self, root: Pid) -> Vec<Pid> {
        self.resolve(root).descendants()
    }
}

/// Row of the process table relevant to tree building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub start_time: u64,
}

/// Build a tree breadth-first from a flat process table
///
/// Siblings are ordered by start time, then pid. A pid seen twice (pid reuse
/// races in the table) is visited once.
pub fn build_tree(root: Pid, table: &[ProcessEntry]) -> ProcessTree {
    if !table.iter().any(|entry| entry.pid == root) {
        return ProcessTree::empty();
    }

    let mut children: HashMap<Pid, Vec<&ProcessEntry>> = HashMap::new();
    for entry in table {
        if let Some(parent) = entry.parent {
            if parent != entry.pid {
                children.entry(parent).or_default().push(entry);
            }
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|entry| (entry.start_time, entry.pid));
    }

    let mut nodes = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([(root, 0)]);

    while let Some((pid, depth)) = queue.pop_front() {
        if !visited.insert(pid) {
            continue;
        }
        nodes.push(TreeNode::new(pid, depth));
        if let Some(kids) = children.get(&pid) {
            queue.extend(kids.iter().map(|child| (child.pid, depth + 1)));
        }
    }

    ProcessTree::from_nodes(nodes)
}

/// Resolver backed by the `sysinfo` process table
pub struct SysinfoTreeResolver {
    system: Mutex<System>,
}

impl SysinfoTreeResolver {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Current process table (threads excluded)
    pub fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .map(|process| ProcessEntry {
                pid: process.pid().as_u32(),
                parent: process.parent().map(|parent| parent.as_u32()),
                start_time: process.start_time(),
            })
            .collect()
    }
}

impl Default for SysinfoTreeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTreeResolver for SysinfoTreeResolver {
    fn resolve(&self, root: Pid) -> ProcessTree {
        let table = self.snapshot();
        let tree = build_tree(root, &table);
        trace!(root, size = tree.len(), "Resolved process tree");
        tree
    }
}
