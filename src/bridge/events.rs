/*!
 * Job Events
 * Typed notifications delivered to the controlling application
 */

use crate::core::errors::ErrorKind;
use crate::core::types::{JobIndex, Pid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel a job's events are published on, `{base}{job_index}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_job(base: &str, index: JobIndex) -> Self {
        Self(format!("{}{}", base, index))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// How one worker of a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerExit {
    pub pid: Pid,
    /// `None` when the worker was ended by a signal
    pub exit_code: Option<i32>,
}

impl WorkerExit {
    #[inline]
    pub fn completed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Overall classification of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// Some steps did not complete
    Warning,
    /// No step completed
    Error,
}

/// Per-worker exit codes of a finished run
///
/// Each worker is one pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSummary {
    pub exits: Vec<WorkerExit>,
    pub incomplete_steps: usize,
    pub total_steps: usize,
}

impl ExitSummary {
    pub fn from_exits(exits: Vec<WorkerExit>) -> Self {
        let incomplete_steps = exits.iter().filter(|exit| !exit.completed()).count();
        Self {
            total_steps: exits.len(),
            incomplete_steps,
            exits,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.incomplete_steps == 0 {
            RunOutcome::Success
        } else if self.incomplete_steps < self.total_steps {
            RunOutcome::Warning
        } else {
            RunOutcome::Error
        }
    }

    /// Exit code reported for the run as a whole
    ///
    /// The first failing worker decides; `None` if it was signalled.
    pub fn worst_exit_code(&self) -> Option<i32> {
        match self.exits.iter().find(|exit| !exit.completed()) {
            Some(failed) => failed.exit_code,
            None => Some(0),
        }
    }
}

/// Status notification for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum JobEvent {
    #[serde(rename = "process-spawned")]
    Spawned { pids: Vec<Pid> },

    #[serde(rename = "process-paused")]
    Paused { message: String, failed: bool },

    #[serde(rename = "process-resumed")]
    Resumed { message: String, failed: bool },

    #[serde(rename = "process-closed")]
    Closed {
        pid: Pid,
        exit_code: Option<i32>,
        summary: ExitSummary,
    },

    #[serde(rename = "process-errored")]
    Errored {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        pid: Option<Pid>,
        kind: ErrorKind,
        message: String,
    },
}

impl JobEvent {
    /// Wire name of the event
    pub const fn name(&self) -> &'static str {
        match self {
            JobEvent::Spawned { .. } => "process-spawned",
            JobEvent::Paused { .. } => "process-paused",
            JobEvent::Resumed { .. } => "process-resumed",
            JobEvent::Closed { .. } => "process-closed",
            JobEvent::Errored { .. } => "process-errored",
        }
    }
}
