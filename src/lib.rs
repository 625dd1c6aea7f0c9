/*!
 * Pipeline Supervisor Library
 * Launch, pause, resume and terminate pipeline jobs as OS process trees
 */

pub mod bridge;
pub mod core;
pub mod monitoring;
pub mod process;
pub mod scheduler;
pub mod supervisor;

// Re-exports
pub use bridge::{ChannelId, EventBridge, ExitSummary, JobEvent, RunOutcome, WorkerExit};
pub use self::core::{
    ConfigError, ErrorKind, SchedulerError, SignalError, SupervisorConfig, SupervisorError,
    SupervisorResult,
};
pub use monitoring::init_tracing;
pub use process::{
    ControlResult, JobConfig, PlatformSignaler, ProcessController, ProcessTree,
    ProcessTreeResolver, SysinfoTreeResolver,
};
pub use scheduler::{Job, JobRegistry, JobStatus, ModuleSelection, RunPlan};
pub use supervisor::{Supervisor, SupervisorBuilder};
