// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Subprocess execution with an environment overlay and an enforced timeout.
//!
//! Both output streams are drained on their own tasks while the child is
//! awaited, so a chatty process can never fill a pipe and stall. Every line
//! is forwarded to `tracing` at debug level as it arrives.

use crate::shared::error::{ClusterError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long to wait for the output pipes to close once the child has exited.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment; these win on collision
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: None,
        }
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short reason for a failed run, for error messages.
    pub fn failure_reason(&self) -> String {
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        if self.stderr.is_empty() {
            format!("exit code {}", code)
        } else {
            format!("exit code {}: {}", code, self.stderr)
        }
    }
}

#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one child process to completion or until its timeout elapses.
    ///
    /// A non-zero exit is reported through `ProcessOutput::exit_code`, not as
    /// an error. An elapsed timeout kills the child and yields
    /// `ClusterError::ProcessTimeout`.
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let shown = spec.display();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %shown, "spawning process");
        let mut child = command.spawn().map_err(|source| ClusterError::Spawn {
            command: shown.clone(),
            source,
        })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain_lines(out, shown.clone(), "stdout")));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(drain_lines(err, shown.clone(), "stderr")));

        let status = match spec.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(command = %shown, timeout = ?limit, "process timed out; killing");
                    if let Err(err) = child.kill().await {
                        warn!(command = %shown, error = %err, "failed to kill timed-out process");
                    }
                    abort(stdout_task);
                    abort(stderr_task);
                    return Err(ClusterError::ProcessTimeout {
                        command: shown,
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await?,
        };

        let stdout = collect(stdout_task, &shown, "stdout").await;
        let stderr = collect(stderr_task, &shown, "stderr").await;

        debug!(command = %shown, exit_code = ?status.code(), "process finished");
        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

type DrainTask = JoinHandle<std::io::Result<Vec<String>>>;

async fn drain_lines<R>(reader: R, command: String, stream: &'static str) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = Vec::new();
    while let Some(line) = lines.next_line().await? {
        debug!(command = %command, stream, "{}", line);
        captured.push(line);
    }
    Ok(captured)
}

async fn collect(task: Option<DrainTask>, command: &str, stream: &'static str) -> String {
    let Some(mut task) = task else {
        return String::new();
    };

    match timeout(IO_CAPTURE_TIMEOUT, &mut task).await {
        Ok(Ok(Ok(lines))) => join_non_empty(&lines),
        Ok(Ok(Err(err))) => {
            warn!(command, stream, error = %err, "output capture failed");
            String::new()
        }
        Ok(Err(err)) => {
            warn!(command, stream, error = %err, "output capture task panicked");
            String::new()
        }
        Err(_) => {
            warn!(command, stream, "output capture timed out");
            task.abort();
            String::new()
        }
    }
}

fn abort(task: Option<DrainTask>) {
    if let Some(task) = task {
        task.abort();
    }
}

/// Blank lines carry no information and are dropped.
fn join_non_empty(lines: &[String]) -> String {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}
