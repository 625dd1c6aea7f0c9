/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{CoreCount, JobIndex, Pid};
use crate::scheduler::{JobStatus, ModuleSelection};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signal primitive result
pub type SignalResult<T> = Result<T, SignalError>;

/// Registry/scheduling result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Control surface result
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Coarse error classification reported to the calling application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SpawnFailure,
    SignalFailure,
    StaleProcess,
    SchedulingConflict,
    PlatformUnavailable,
    InvalidRequest,
}

/// Errors raised by a single suspend/resume/terminate primitive
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SignalError {
    #[error("Process {0} has already exited")]
    #[diagnostic(
        code(signal::stale_process),
        help("The process exited between enumeration and control.")
    )]
    StaleProcess(Pid),

    #[error("Signal delivery to process {pid} failed: {reason}")]
    #[diagnostic(
        code(signal::delivery_failed),
        help("Check that the supervisor owns the process and has permission to signal it.")
    )]
    SignalFailure { pid: Pid, reason: String },

    #[error("Process suspension unavailable: {0}")]
    #[diagnostic(
        code(signal::platform_unavailable),
        help("Pause and resume are disabled for this session. Terminate still works.")
    )]
    PlatformUnavailable(String),
}

impl SignalError {
    /// Build a delivery failure from any displayable cause
    pub fn failure(pid: Pid, reason: impl ToString) -> Self {
        SignalError::SignalFailure {
            pid,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::StaleProcess(_) => ErrorKind::StaleProcess,
            SignalError::SignalFailure { .. } => ErrorKind::SignalFailure,
            SignalError::PlatformUnavailable(_) => ErrorKind::PlatformUnavailable,
        }
    }
}

/// Job registry invariant violations
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Job {0} not found")]
    #[diagnostic(
        code(scheduler::job_not_found),
        help("The job slot may have been removed.")
    )]
    JobNotFound(JobIndex),

    #[error("Core budget exceeded: requested {requested}, {available} of {budget} available")]
    #[diagnostic(
        code(scheduler::core_budget_exceeded),
        help("Lower the core count of another job or remove an idle job slot.")
    )]
    CoreBudgetExceeded {
        requested: CoreCount,
        available: CoreCount,
        budget: CoreCount,
    },

    #[error("Module {module:?} runs on a single core, {requested} requested")]
    #[diagnostic(
        code(scheduler::single_core_module),
        help("This module cannot be split across cores.")
    )]
    SingleCoreModule {
        module: ModuleSelection,
        requested: CoreCount,
    },

    #[error("Core count must be at least 1, got {0}")]
    #[diagnostic(code(scheduler::invalid_core_count))]
    InvalidCoreCount(CoreCount),

    #[error("Root path {path} is already in use by job {holder}")]
    #[diagnostic(
        code(scheduler::duplicate_root_path),
        help("Wait for the other job to finish or choose a different dataset.")
    )]
    DuplicateRootPath { path: String, holder: JobIndex },

    #[error("Job {0} is active")]
    #[diagnostic(
        code(scheduler::job_active),
        help("Terminate the job before changing or removing it.")
    )]
    JobActive(JobIndex),

    #[error("Invalid status transition for job {index}: {from:?} -> {to:?}")]
    #[diagnostic(code(scheduler::invalid_transition))]
    InvalidTransition {
        index: JobIndex,
        from: JobStatus,
        to: JobStatus,
    },
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::CoreBudgetExceeded { .. }
            | SchedulerError::SingleCoreModule { .. }
            | SchedulerError::DuplicateRootPath { .. } => ErrorKind::SchedulingConflict,
            SchedulerError::JobNotFound(_)
            | SchedulerError::InvalidCoreCount(_)
            | SchedulerError::JobActive(_)
            | SchedulerError::InvalidTransition { .. } => ErrorKind::InvalidRequest,
        }
    }
}

/// Errors surfaced by the supervisor control surface
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SupervisorError {
    #[error("Failed to start job {index}: {reason}")]
    #[diagnostic(
        code(supervisor::spawn_failed),
        help("Check that the pipeline executable exists and the arguments are valid.")
    )]
    SpawnFailure { index: JobIndex, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduling(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Signal(#[from] SignalError),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            SupervisorError::Scheduling(e) => e.kind(),
            SupervisorError::Signal(e) => e.kind(),
        }
    }
}
