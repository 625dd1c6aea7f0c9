/*!
 * Scheduler Types
 * Job slots, their status and module selection
 */

use crate::core::limits::DEFAULT_JOB_CORES;
use crate::core::types::{CoreCount, JobIndex, Pid, RunId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Configured but not running, no pids
    Standby,
    /// Worker processes are executing
    Running,
    /// Worker processes are suspended
    Paused,
}

impl JobStatus {
    /// Whether the job holds live processes
    #[inline(always)]
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, JobStatus::Standby)
    }

    /// Validate a status transition
    ///
    /// Standby -> Running -> Paused -> Running, and any active state may
    /// return to Standby (close, terminate, error). Staying put is allowed.
    #[must_use]
    pub const fn can_transition_to(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Standby, JobStatus::Standby)
                | (JobStatus::Standby, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Paused)
                | (JobStatus::Running, JobStatus::Standby)
                | (JobStatus::Paused, JobStatus::Paused)
                | (JobStatus::Paused, JobStatus::Running)
                | (JobStatus::Paused, JobStatus::Standby)
        )
    }
}

/// Pipeline module a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSelection {
    /// Per-participant processing, can be split across cores
    #[default]
    Participant,
    /// Population-level analysis, single core only
    Population,
}

impl ModuleSelection {
    #[inline]
    #[must_use]
    pub const fn is_single_core(self) -> bool {
        matches!(self, ModuleSelection::Population)
    }

    /// Largest core count the module accepts, if bounded
    #[inline]
    #[must_use]
    pub const fn max_cores(self) -> Option<CoreCount> {
        if self.is_single_core() {
            Some(1)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ModuleSelection::Participant => "participant",
            ModuleSelection::Population => "population",
        }
    }
}

impl fmt::Display for ModuleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participant" => Ok(ModuleSelection::Participant),
            "population" => Ok(ModuleSelection::Population),
            other => Err(format!("unknown module: {}", other)),
        }
    }
}

/// A job slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Job {
    pub index: JobIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_path: Option<PathBuf>,
    pub core_count: CoreCount,
    pub module: ModuleSelection,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub pids: Vec<Pid>,
    /// Generation of the current (or last) run
    pub run_id: RunId,
}

impl Job {
    #[must_use]
    pub fn new(index: JobIndex) -> Self {
        Self {
            index,
            root_path: None,
            core_count: DEFAULT_JOB_CORES,
            module: ModuleSelection::default(),
            status: JobStatus::Standby,
            pids: Vec::new(),
            run_id: 0,
        }
    }

    #[inline(always)]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    #[inline]
    #[must_use]
    pub fn owns(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }
}

/// Settings a run was reserved with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub run_id: RunId,
    pub core_count: CoreCount,
    pub module: ModuleSelection,
}
