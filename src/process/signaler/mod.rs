/*!
 * Platform Signaling
 * Suspend, resume and terminate primitives for a single OS process
 *
 * Exactly one implementation is active per host, selected at startup:
 * - POSIX: signals addressed to the process group, so one call reaches the
 *   whole tree
 * - Windows: per-thread suspend/resume of one process, the caller walks the
 *   tree itself
 */

use crate::core::errors::SignalResult;
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixSignaler;
#[cfg(windows)]
pub use windows::WindowsSignaler;

/// Which signaling model is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalerKind {
    Posix,
    Windows,
}

/// Process control primitives
pub trait PlatformSignaler: Send + Sync {
    fn kind(&self) -> SignalerKind;

    /// Whether one call against a root pid reaches all of its descendants
    fn propagates_to_group(&self) -> bool;

    /// Whether suspend/resume can be used in this session
    ///
    /// Returns `PlatformUnavailable` when the native primitive failed to
    /// initialize. Terminate does not depend on it.
    fn suspension_available(&self) -> SignalResult<()> {
        Ok(())
    }

    /// Freeze execution of `pid`
    fn suspend(&self, pid: Pid) -> SignalResult<()>;

    /// Unfreeze execution of `pid`; a no-op for a running process
    fn resume(&self, pid: Pid) -> SignalResult<()>;

    /// Ask `pid` to exit, resuming it first so the request can be handled
    fn terminate(&self, pid: Pid) -> SignalResult<()>;

    /// Forcefully end `pid`
    fn kill(&self, pid: Pid) -> SignalResult<()>;

    /// Whether `pid` is still executing (exited-but-unreaped counts as dead)
    fn is_alive(&self, pid: Pid) -> bool;

    /// Whether anything reached by signalling `pid` is still executing
    ///
    /// For group-propagating signalers this covers members that outlive the
    /// group leader.
    fn group_alive(&self, pid: Pid) -> bool {
        self.is_alive(pid)
    }
}

/// Signaler for the host platform
#[cfg(unix)]
pub fn platform_signaler() -> Arc<dyn PlatformSignaler> {
    Arc::new(PosixSignaler::new())
}

/// Signaler for the host platform
#[cfg(windows)]
pub fn platform_signaler() -> Arc<dyn PlatformSignaler> {
    Arc::new(WindowsSignaler::new())
}
