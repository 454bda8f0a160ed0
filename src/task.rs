//! Single-shot task abstraction.
//!
//! A [`Task`] is consumed by running it once. Closures become tasks through
//! [`from_fn`], or [`from_sync`] when they never await. [`CommandTask`] runs
//! an external program the way an operator would from a shell, without the
//! shell.

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// One asynchronous unit of work.
pub trait Task: Send + 'static {
    type Output;
    type Error;

    /// Reject the task before it is queued. The default accepts everything.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }

    /// Execute the task to completion.
    fn run(self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send + 'static;
}

/// A task backed by a closure returning a future.
pub struct FnTask<F>(F);

/// Wrap a nullary async closure as a [`Task`].
pub fn from_fn<F, Fut, T, E>(f: F) -> FnTask<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    FnTask(f)
}

impl<F, Fut, T, E> Task for FnTask<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    type Output = T;
    type Error = E;

    fn run(self) -> impl Future<Output = Result<T, E>> + Send + 'static {
        (self.0)()
    }
}

/// A task backed by a plain closure.
pub struct SyncTask<F>(F);

/// Wrap a synchronous closure as a [`Task`].
///
/// The body runs on an async worker, so it should be short. Blocking work
/// belongs in [`tokio::task::spawn_blocking`] behind [`from_fn`] instead.
pub fn from_sync<F, T, E>(f: F) -> SyncTask<F>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    SyncTask(f)
}

impl<F, T, E> Task for SyncTask<F>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    fn run(self) -> impl Future<Output = Result<T, E>> + Send + 'static {
        async move { (self.0)() }
    }
}

// ---------------------------------------------------------------------------
// External commands
// ---------------------------------------------------------------------------

/// Captured result of a command that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with status {code:?}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Runs a program with arguments and captures its output.
#[derive(Debug, Clone, Default)]
pub struct CommandTask {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandTask {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Split a command line on whitespace: the first word is the program.
    /// No quoting rules apply.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let program = words.next().unwrap_or_default();
        Self::new(program).args(words)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Relative paths with a directory component resolve against the
    /// process CWD, not `current_dir`. Bare names go through `PATH`.
    fn resolved_program(&self) -> PathBuf {
        let relative_with_dir =
            self.program.is_relative() && self.program.components().count() > 1;
        if relative_with_dir && self.current_dir.is_some() {
            if let Ok(cwd) = std::env::current_dir() {
                return cwd.join(&self.program);
            }
        }
        self.program.clone()
    }
}

impl Task for CommandTask {
    type Output = CommandOutput;
    type Error = CommandError;

    fn check(&self) -> Result<(), String> {
        if self.program.as_os_str().is_empty() {
            return Err("command has no program to run".to_string());
        }
        Ok(())
    }

    fn run(self) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send + 'static {
        async move {
            let program = self.resolved_program();
            let name = program.display().to_string();
            let start = Instant::now();

            let mut cmd = Command::new(&program);
            cmd.args(&self.args).kill_on_drop(true);
            if let Some(ref dir) = self.current_dir {
                cmd.current_dir(dir);
            }
            for (key, value) in &self.env {
                cmd.env(key, value);
            }

            debug!(program = %name, args = ?self.args, "running command");

            let output = cmd.output().await.map_err(|e| CommandError::Spawn {
                program: name.clone(),
                reason: e.to_string(),
            })?;

            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.status.success() {
                return Err(CommandError::Exit {
                    program: name,
                    code: output.status.code(),
                    stderr,
                });
            }

            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}
