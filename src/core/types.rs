/*!
 * Core Types
 * Common types used across the supervisor
 */

/// OS process ID type
pub type Pid = u32;

/// Stable ordinal identity of a job slot
pub type JobIndex = usize;

/// Number of CPU cores allocated to a job
pub type CoreCount = usize;

/// Depth of a process within a resolved tree (root is 0)
pub type Depth = usize;

/// Generation counter distinguishing successive runs of the same job slot
pub type RunId = u64;
