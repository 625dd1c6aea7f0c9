/*!
 * Scheduler
 * Job slots and shared core budget
 */

mod registry;
mod types;

pub use registry::JobRegistry;
pub use types::{Job, JobStatus, ModuleSelection, RunPlan};
