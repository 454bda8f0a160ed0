//! laneq CLI — run commands through per-lane FIFO queues.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use laneq::config::Config;
use laneq::error::TaskError;
use laneq::task::{CommandError, CommandOutput, CommandTask};
use laneq::telemetry::{TelemetryConfig, init_telemetry};
use laneq::LaneQueue;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[derive(Parser)]
#[command(name = "laneq", about = "Run commands one at a time per lane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit commands to lanes and wait for all of them
    Run {
        /// LANE=COMMAND, repeatable. Same-lane commands run in the order given.
        #[arg(short, long = "task", value_parser = parse_task_spec, required = true)]
        tasks: Vec<TaskSpec>,
        /// Working directory for every command
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Print lane events as JSON lines instead of a result table
        #[arg(long)]
        events: bool,
    },
}

#[derive(Debug, Clone)]
struct TaskSpec {
    lane: String,
    command: String,
}

fn parse_task_spec(raw: &str) -> Result<TaskSpec, String> {
    let (lane, command) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LANE=COMMAND, got '{raw}'"))?;
    let lane = lane.trim();
    if lane.is_empty() {
        return Err(format!("missing lane name in '{raw}'"));
    }
    Ok(TaskSpec {
        lane: lane.to_string(),
        command: command.trim().to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "laneq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Run { tasks, dir, events } => cmd_run(&config, tasks, dir, events).await,
    }
}

async fn cmd_run(
    config: &Config,
    tasks: Vec<TaskSpec>,
    dir: Option<PathBuf>,
    events: bool,
) -> anyhow::Result<()> {
    let queue: LaneQueue = LaneQueue::from_config(config);

    let printer = events.then(|| {
        let mut rx = queue.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("cannot encode event: {e}"),
                    },
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let mut pending = Vec::with_capacity(tasks.len());
    for (index, spec) in tasks.iter().enumerate() {
        let mut task = CommandTask::parse(&spec.command);
        if let Some(ref dir) = dir {
            task = task.current_dir(dir);
        }
        let completion = queue
            .submit(spec.lane.clone(), task)
            .with_context(|| format!("task #{index} on lane '{}'", spec.lane))?;
        pending.push((index, spec, completion));
    }

    if !events {
        println!("{:<4}  {:<16}  {:<8}  {:>8}  DETAIL", "#", "LANE", "RESULT", "MS");
        println!("{}", "-".repeat(72));
    }

    let total = pending.len();
    let mut failed = 0;
    for (index, spec, completion) in pending {
        let result = completion.await;
        if result.is_err() {
            failed += 1;
        }
        if !events {
            print_result(index, &spec.lane, &result);
        }
    }

    // Closing the queue ends the event stream once every drain has exited.
    drop(queue);
    if let Some(printer) = printer {
        printer.await?;
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} task(s) failed");
    }
    Ok(())
}

fn print_result(index: usize, lane: &str, result: &Result<CommandOutput, TaskError<CommandError>>) {
    let (status, ms, detail) = match result {
        Ok(out) => (
            "ok",
            out.duration_ms.to_string(),
            out.stdout.lines().next().unwrap_or("").to_string(),
        ),
        Err(TaskError::Failed(CommandError::Exit { code, stderr, .. })) => (
            "failed",
            "-".to_string(),
            format!(
                "exit {}: {}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr.lines().next().unwrap_or("")
            ),
        ),
        Err(e) => ("failed", "-".to_string(), e.to_string()),
    };
    println!("{index:<4}  {lane:<16}  {status:<8}  {ms:>8}  {detail}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_spec_splits_on_first_equals() {
        let spec = parse_task_spec("build = make FOO=1").unwrap();
        assert_eq!(spec.lane, "build");
        assert_eq!(spec.command, "make FOO=1");
    }

    #[test]
    fn task_spec_requires_lane() {
        assert!(parse_task_spec("=echo hi").is_err());
        assert!(parse_task_spec("echo hi").is_err());
    }

    #[test]
    fn cli_requires_at_least_one_task() {
        assert!(Cli::try_parse_from(["laneq", "run"]).is_err());
        let cli = Cli::try_parse_from(["laneq", "run", "-t", "a=true", "-t", "a=false"]).unwrap();
        let Command::Run { tasks, .. } = cli.command;
        assert_eq!(tasks.len(), 2);
    }
}
