/*!
 * Windows Process Control
 * Per-thread suspend/resume through the Toolhelp thread snapshot
 *
 * Windows has no stop signal and no group propagation: suspending a process
 * means suspending each of its threads, and only the given process is
 * affected. The controller walks the tree and calls in here per pid.
 */

use super::{PlatformSignaler, SignalerKind};
use crate::core::errors::{SignalError, SignalResult};
use crate::core::types::Pid;
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE, STILL_ACTIVE};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, OpenThread, ResumeThread, SuspendThread, TerminateProcess,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE, THREAD_SUSPEND_RESUME,
};

/// Exit code given to forcefully terminated processes
const FORCED_EXIT_CODE: u32 = 1;

/// Owned Win32 handle, closed on drop
struct OwnedHandle(HANDLE);

impl OwnedHandle {
    fn open(handle: HANDLE) -> Option<Self> {
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            None
        } else {
            Some(Self(handle))
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful Win32 open call
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn last_error() -> String {
    std::io::Error::last_os_error().to_string()
}

/// Thread ids currently owned by `pid`
fn thread_ids(pid: Pid) -> Result<Vec<u32>, String> {
    // SAFETY: snapshot handle is checked and owned; the entry is a plain
    // C struct sized before the first call as the API requires
    unsafe {
        let snapshot = OwnedHandle::open(CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0))
            .ok_or_else(last_error)?;

        let mut entry: THREADENTRY32 = std::mem::zeroed();
        entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;

        let mut ids = Vec::new();
        if Thread32First(snapshot.0, &mut entry) != 0 {
            loop {
                if entry.th32OwnerProcessID == pid {
                    ids.push(entry.th32ThreadID);
                }
                if Thread32Next(snapshot.0, &mut entry) == 0 {
                    break;
                }
            }
        }
        Ok(ids)
    }
}

/// Thread-suspension based process control
pub struct WindowsSignaler {
    suspension: Result<(), String>,
}

impl WindowsSignaler {
    /// Check the native snapshot primitive once for the whole session
    pub fn new() -> Self {
        // SAFETY: handle ownership is taken immediately
        let check = unsafe { OwnedHandle::open(CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)) };
        let suspension = match check {
            Some(_) => {
                debug!("Windows signaler selected");
                Ok(())
            }
            None => {
                let reason = last_error();
                warn!(error = %reason, "Thread snapshot unavailable, pause/resume disabled");
                Err(reason)
            }
        };
        Self { suspension }
    }

    /// Apply a suspend/resume primitive to every thread of `pid`
    fn for_each_thread(
        &self,
        pid: Pid,
        action: &'static str,
        primitive: unsafe extern "system" fn(HANDLE) -> u32,
    ) -> SignalResult<()> {
        self.suspension_available()?;

        let ids = thread_ids(pid).map_err(|e| SignalError::failure(pid, e))?;
        if ids.is_empty() {
            return Err(SignalError::StaleProcess(pid));
        }

        let mut failed = Vec::new();
        for tid in ids {
            // SAFETY: handle is checked and owned for the duration of the call
            let outcome = unsafe {
                match OwnedHandle::open(OpenThread(THREAD_SUSPEND_RESUME, 0, tid)) {
                    // Thread exited after the snapshot
                    None => continue,
                    Some(thread) => primitive(thread.0),
                }
            };
            if outcome == u32::MAX {
                failed.push(format!("thread {}: {}", tid, last_error()));
            }
        }

        if failed.is_empty() {
            debug!(pid, action, "Threads updated");
            Ok(())
        } else {
            Err(SignalError::failure(
                pid,
                format!("{} failed for {}", action, failed.join(", ")),
            ))
        }
    }
}

impl Default for WindowsSignaler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformSignaler for WindowsSignaler {
    fn kind(&self) -> SignalerKind {
        SignalerKind::Windows
    }

    fn propagates_to_group(&self) -> bool {
        false
    }

    fn suspension_available(&self) -> SignalResult<()> {
        self.suspension
            .clone()
            .map_err(SignalError::PlatformUnavailable)
    }

    fn suspend(&self, pid: Pid) -> SignalResult<()> {
        self.for_each_thread(pid, "suspend", SuspendThread)
    }

    fn resume(&self, pid: Pid) -> SignalResult<()> {
        self.for_each_thread(pid, "resume", ResumeThread)
    }

    fn terminate(&self, pid: Pid) -> SignalResult<()> {
        if !self.is_alive(pid) {
            return Err(SignalError::StaleProcess(pid));
        }
        if self.suspension.is_ok() {
            match self.resume(pid) {
                Ok(()) | Err(SignalError::StaleProcess(_)) => {}
                Err(e) => warn!(pid, error = %e, "Resume before terminate failed"),
            }
        }

        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SignalError::failure(pid, e))?;

        if status.success() || !self.is_alive(pid) {
            Ok(())
        } else {
            Err(SignalError::failure(
                pid,
                format!("taskkill exited with {}", status),
            ))
        }
    }

    fn kill(&self, pid: Pid) -> SignalResult<()> {
        // SAFETY: handle is checked and owned for the duration of the call
        unsafe {
            let Some(process) = OwnedHandle::open(OpenProcess(PROCESS_TERMINATE, 0, pid)) else {
                return if self.is_alive(pid) {
                    Err(SignalError::failure(pid, last_error()))
                } else {
                    Err(SignalError::StaleProcess(pid))
                };
            };
            if TerminateProcess(process.0, FORCED_EXIT_CODE) == 0 {
                return Err(SignalError::failure(pid, last_error()));
            }
        }
        debug!(pid, "Process terminated forcefully");
        Ok(())
    }

    fn is_alive(&self, pid: Pid) -> bool {
        // SAFETY: handle is checked and owned; exit code is a local out-param
        unsafe {
            let Some(process) =
                OwnedHandle::open(OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid))
            else {
                return false;
            };
            let mut code = 0u32;
            GetExitCodeProcess(process.0, &mut code) != 0 && code == STILL_ACTIVE as u32
        }
    }
}
