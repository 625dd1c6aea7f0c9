/*!
 * Job Launcher
 * Starts the worker processes of one pipeline run
 *
 * One worker per allocated core. On POSIX each worker leads its own process
 * group so group signals reach everything it forks; on Windows each worker
 * gets a new console process group.
 */

use crate::core::errors::{SupervisorError, SupervisorResult};
use crate::core::limits::{ENV_MODULE, ENV_ROOT_PATH, ENV_WORKER_COUNT, ENV_WORKER_INDEX};
use crate::core::types::{CoreCount, JobIndex, Pid};
use crate::scheduler::ModuleSelection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// What to run for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Dataset root the pipeline works on
    pub root_path: PathBuf,
    /// Pipeline executable
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// Defaults to the dataset root
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl JobConfig {
    pub fn new(root_path: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            program: program.into(),
            args: Vec::new(),
            env_vars: HashMap::new(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Reject configurations that can never start
    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("Empty command".to_string());
        }
        if self.program.contains('\0') || self.args.iter().any(|arg| arg.contains('\0')) {
            return Err("Command contains NUL byte".to_string());
        }
        if !self.root_path.is_dir() {
            return Err(format!(
                "Root path {} is not a directory",
                self.root_path.display()
            ));
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(format!("Working directory {} is not a directory", dir.display()));
            }
        }
        Ok(())
    }
}

/// A started worker and its handle
#[derive(Debug)]
pub struct LaunchedWorker {
    pub pid: Pid,
    pub child: Child,
}

/// Spawns pipeline workers
#[derive(Debug, Clone, Default)]
pub struct JobLauncher;

impl JobLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Start `workers` processes for job `index`
    ///
    /// All or nothing: when one worker fails to start, the ones already
    /// started are killed and reaped before the error is returned.
    pub async fn launch(
        &self,
        index: JobIndex,
        config: &JobConfig,
        module: ModuleSelection,
        workers: CoreCount,
    ) -> SupervisorResult<Vec<LaunchedWorker>> {
        config.validate().map_err(|reason| spawn_failure(index, reason))?;

        let workers = match module.max_cores() {
            Some(max) => workers.min(max),
            None => workers,
        }
        .max(1);

        let mut launched = Vec::with_capacity(workers);
        for worker in 0..workers {
            match self.start_worker(config, module, worker, workers) {
                Ok(started) => launched.push(started),
                Err(e) => {
                    error!(job = index, worker, error = %e, "Worker failed to start");
                    abort(launched).await;
                    return Err(spawn_failure(index, format!("{}: {}", config.program, e)));
                }
            }
        }

        info!(
            job = index,
            program = %config.program,
            pids = ?launched.iter().map(|w| w.pid).collect::<Vec<_>>(),
            "Job workers started"
        );
        Ok(launched)
    }

    fn start_worker(
        &self,
        config: &JobConfig,
        module: ModuleSelection,
        worker: usize,
        workers: usize,
    ) -> std::io::Result<LaunchedWorker> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .envs(&config.env_vars)
            .env(ENV_ROOT_PATH, &config.root_path)
            .env(ENV_MODULE, module.as_str())
            .env(ENV_WORKER_INDEX, worker.to_string())
            .env(ENV_WORKER_COUNT, workers.to_string())
            .current_dir(config.working_dir.as_deref().unwrap_or(&config.root_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP);

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "worker exited before reporting a pid")
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(pid, "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(pid, "stderr", stderr));
        }

        debug!(pid, worker, workers, "Worker spawned");
        Ok(LaunchedWorker { pid, child })
    }
}

fn spawn_failure(index: JobIndex, reason: impl Into<String>) -> SupervisorError {
    SupervisorError::SpawnFailure {
        index,
        reason: reason.into(),
    }
}

async fn abort(workers: Vec<LaunchedWorker>) {
    for mut worker in workers {
        if let Err(e) = worker.child.start_kill() {
            warn!(pid = worker.pid, error = %e, "Failed to kill partially started worker");
            continue;
        }
        if let Err(e) = worker.child.wait().await {
            warn!(pid = worker.pid, error = %e, "Failed to reap partially started worker");
        }
    }
}

async fn forward_output<R>(pid: Pid, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(pid, stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(pid, stream, error = %e, "Output stream closed");
                break;
            }
        }
    }
}
