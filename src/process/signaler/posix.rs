/*!
 * POSIX Signaling
 * SIGSTOP/SIGCONT/SIGTERM/SIGKILL delivered to process groups
 *
 * Workers are spawned as process-group leaders, so signalling the group of a
 * worker pid reaches every helper it forked without walking the tree.
 */

use super::{PlatformSignaler, SignalerKind};
use crate::core::errors::{SignalError, SignalResult};
use crate::core::types::Pid;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid as NixPid};
use parking_lot::Mutex;
use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Signal-based process control
pub struct PosixSignaler {
    system: Mutex<System>,
}

impl PosixSignaler {
    pub fn new() -> Self {
        debug!("POSIX signaler selected");
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Deliver `signal` to the group led by `pid`, or to `pid` alone when it
    /// is not a group leader
    fn send(&self, pid: Pid, signal: Signal) -> SignalResult<()> {
        let target = to_nix(pid)?;

        let delivered = match getpgid(Some(target)) {
            Ok(pgid) if pgid == target => killpg(pgid, signal),
            Ok(_) => kill(target, signal),
            // Leader already gone; surviving members keep its group id
            Err(Errno::ESRCH) => killpg(target, signal),
            Err(e) => return Err(SignalError::failure(pid, e)),
        };

        match delivered {
            Ok(()) => {
                debug!(pid, ?signal, "Signal delivered");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(SignalError::StaleProcess(pid)),
            Err(e) => {
                warn!(pid, ?signal, error = %e, "Signal delivery failed");
                Err(SignalError::failure(pid, e))
            }
        }
    }

    fn is_zombie(&self, pid: Pid) -> bool {
        let sys_pid = SysPid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        system
            .process(sys_pid)
            .map(|process| process.status() == ProcessStatus::Zombie)
            .unwrap_or(false)
    }

    /// Any non-zombie process left in group `pgid`
    fn has_running_member(&self, pgid: NixPid) -> bool {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        system.processes().iter().any(|(sys_pid, process)| {
            process.thread_kind().is_none()
                && process.status() != ProcessStatus::Zombie
                && to_nix(sys_pid.as_u32())
                    .ok()
                    .and_then(|member| getpgid(Some(member)).ok())
                    == Some(pgid)
        })
    }
}

impl Default for PosixSignaler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformSignaler for PosixSignaler {
    fn kind(&self) -> SignalerKind {
        SignalerKind::Posix
    }

    fn propagates_to_group(&self) -> bool {
        true
    }

    fn suspend(&self, pid: Pid) -> SignalResult<()> {
        self.send(pid, Signal::SIGSTOP)
    }

    fn resume(&self, pid: Pid) -> SignalResult<()> {
        self.send(pid, Signal::SIGCONT)
    }

    fn terminate(&self, pid: Pid) -> SignalResult<()> {
        // A stopped group would only queue SIGTERM
        match self.send(pid, Signal::SIGCONT) {
            Ok(()) | Err(SignalError::StaleProcess(_)) => {}
            Err(e) => warn!(pid, error = %e, "Resume before terminate failed"),
        }
        self.send(pid, Signal::SIGTERM)
    }

    fn kill(&self, pid: Pid) -> SignalResult<()> {
        self.send(pid, Signal::SIGKILL)
    }

    fn is_alive(&self, pid: Pid) -> bool {
        let Ok(target) = to_nix(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) => !self.is_zombie(pid),
            // Exists but owned by someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn group_alive(&self, pid: Pid) -> bool {
        let Ok(target) = to_nix(pid) else {
            return false;
        };
        let pgid = match getpgid(Some(target)) {
            Ok(pgid) if pgid == target => pgid,
            Ok(_) => return self.is_alive(pid),
            Err(Errno::ESRCH) => target,
            Err(_) => return self.is_alive(pid),
        };
        match killpg(pgid, None) {
            // An unreaped leader keeps the group addressable
            Ok(()) => self.has_running_member(pgid),
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

fn to_nix(pid: Pid) -> SignalResult<NixPid> {
    // 0 and negative values address groups, never accept them as a pid
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(NixPid::from_raw(raw)),
        _ => Err(SignalError::failure(pid, "invalid pid")),
    }
}
