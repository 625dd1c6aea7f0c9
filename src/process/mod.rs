/*!
 * Process Module
 * Process tree resolution, platform signaling, tree control and worker launch
 */

pub mod controller;
pub mod launcher;
pub mod signaler;
pub mod tree;
pub mod types;

// Re-export for convenience
pub use controller::ProcessController;
pub use launcher::{JobConfig, JobLauncher, LaunchedWorker};
pub use signaler::{platform_signaler, PlatformSignaler, SignalerKind};
pub use tree::{build_tree, ProcessEntry, ProcessTreeResolver, SysinfoTreeResolver};
pub use types::{
    ControlOp, ControlResult, PauseResumeResult, PidOutcome, ProcessTree, TerminateResult,
    TreeNode,
};
