/*!
 * Pipeline Supervisor - Main Entry Point
 *
 * Runs one pipeline job under supervision:
 * - spawns it over the given dataset root
 * - prints job events as JSON lines on stdout
 * - reads `pause`, `resume` and `terminate` commands from stdin
 * - terminates the job on Ctrl+C
 */

use anyhow::{bail, Context, Result};
use pipeline_supervisor::{init_tracing, JobConfig, JobEvent, Supervisor, SupervisorConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SupervisorConfig::from_env().context("Invalid supervisor configuration")?;
    init_tracing(config.trace_json);

    let mut argv = std::env::args().skip(1);
    let (Some(root_path), Some(program)) = (argv.next(), argv.next()) else {
        bail!("usage: supervisor <root_path> <program> [args...]");
    };
    let job_config = JobConfig::new(root_path, program).with_args(argv);

    info!("Pipeline supervisor starting...");
    let supervisor = Supervisor::builder().with_config(config).build();
    let index = supervisor.registry().add_job_slot()?;
    let channel = supervisor.channel_for(index);
    let mut events = supervisor.bridge().subscribe(&channel);

    let pids = supervisor.spawn(index, job_config).await?;
    let primary = *pids.first().context("Job started no workers")?;
    info!(job = index, channel = %channel, "Job running, press Ctrl+C to terminate");

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if matches!(event, JobEvent::Closed { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            line = commands.next_line(), if stdin_open => match line? {
                Some(line) => match line.trim() {
                    "pause" => { supervisor.pause(primary, &channel).await; }
                    "resume" => { supervisor.resume(primary, &channel).await; }
                    "terminate" => { supervisor.terminate(primary, &channel).await; }
                    "" => {}
                    other => warn!(command = other, "Unknown command"),
                },
                None => stdin_open = false,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Interrupt received, terminating job");
                supervisor.terminate(primary, &channel).await;
            }
        }
    }

    info!("Pipeline supervisor exiting");
    Ok(())
}
