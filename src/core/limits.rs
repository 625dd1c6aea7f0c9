/*!
 * Supervisor Limits and Constants
 *
 * Centralized location for timing defaults, scheduling bounds and naming
 * conventions. Values here are defaults; most can be overridden through
 * `SupervisorConfig`.
 */

use std::time::Duration;

// =============================================================================
// TERMINATION
// =============================================================================

/// Grace period between the graceful terminate signal and forceful kill (5s)
/// Long enough for the pipeline to flush partial outputs
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Liveness poll interval while waiting out the grace period (100ms)
pub const DEFAULT_TERMINATE_POLL: Duration = Duration::from_millis(100);

/// Upper bound accepted for a configured grace period (5 minutes)
pub const MAX_TERMINATE_GRACE: Duration = Duration::from_secs(300);

// =============================================================================
// SCHEDULING
// =============================================================================

/// Core count assigned to a freshly added job slot
pub const DEFAULT_JOB_CORES: usize = 1;

/// Smallest physical core budget, even on single-CPU hosts
pub const MIN_CORE_BUDGET: usize = 1;

/// Logical-to-physical divisor used to approximate physical cores
/// (hyper-threading usually exposes two logical CPUs per core)
pub const LOGICAL_PER_PHYSICAL: usize = 2;

// =============================================================================
// EVENTS
// =============================================================================

/// Default per-channel broadcast capacity
/// Slow subscribers lag and miss events instead of blocking publishers
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default channel base name, channels are `{base}{job_index}`
pub const DEFAULT_CHANNEL_BASE: &str = "pipeline-job-";

// =============================================================================
// LAUNCH ENVIRONMENT
// =============================================================================

/// Dataset root handed to each worker
pub const ENV_ROOT_PATH: &str = "PIPELINE_ROOT_PATH";

/// Module selection handed to each worker
pub const ENV_MODULE: &str = "PIPELINE_MODULE";

/// Zero-based worker index within the run
pub const ENV_WORKER_INDEX: &str = "PIPELINE_WORKER_INDEX";

/// Total workers in the run
pub const ENV_WORKER_COUNT: &str = "PIPELINE_WORKER_COUNT";

/// Physical core budget derived from the logical CPU count of this host
pub fn detect_core_budget() -> usize {
    let logical = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_CORE_BUDGET);
    (logical / LOGICAL_PER_PHYSICAL).max(MIN_CORE_BUDGET)
}
