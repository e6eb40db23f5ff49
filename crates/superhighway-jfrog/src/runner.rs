//! External command execution.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use superhighway_core::StepError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn, Instrument, Span};

/// Argument prefixes whose values never reach the logs.
const SECRET_FLAGS: [&str; 3] = ["--password=", "--access-token=", "--apikey="];

/// One external command, fully described.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    pub args: Vec<String>,

    /// Extra environment for this child only.
    pub env: Vec<(String, String)>,

    /// Working directory; inherited when `None`.
    pub cwd: Option<PathBuf>,

    /// Timeout in seconds, 0 for none.
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Run `script` through `bash -c`.
    pub fn shell(script: &str) -> Self {
        Self::new("bash", ["-c", script])
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Value of an environment entry set on this command.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Command line for logs and errors, with secret flag values masked.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            let masked = SECRET_FLAGS
                .iter()
                .find(|flag| arg.starts_with(*flag))
                .map(|flag| format!("{flag}***"));
            parts.push(masked.unwrap_or_else(|| arg.clone()));
        }
        parts.join(" ")
    }
}

/// Output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Last [`OUTPUT_TAIL_LINES`] lines of stdout.
    pub stdout: String,

    /// Last [`OUTPUT_TAIL_LINES`] lines of stderr.
    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lines of each stream kept after they have been logged.
pub const OUTPUT_TAIL_LINES: usize = 200;

/// Lines of stderr attached to a failure warning.
const FAILURE_TAIL_LINES: usize = 20;

/// Runs [`CommandSpec`]s. Swapped for a recorder in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion. A non-zero exit is an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, StepError>;
}

/// Runs commands as child processes, logging their output line by line as
/// it is produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, StepError> {
        let start = Instant::now();
        let command_line = spec.display();
        debug!(command = %command_line, cwd = ?spec.cwd, "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| StepError::Launch {
            command: command_line.clone(),
            source,
        })?;
        // Output lines stay inside the caller's span (branch, build name).
        let stdout_task = tokio::spawn(
            forward_lines(child.stdout.take(), spec.program.clone(), "stdout")
                .instrument(Span::current()),
        );
        let stderr_task = tokio::spawn(
            forward_lines(child.stderr.take(), spec.program.clone(), "stderr")
                .instrument(Span::current()),
        );

        let waited = if spec.timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(spec.timeout_secs), child.wait()).await
            {
                Ok(waited) => waited,
                Err(_) => {
                    child.kill().await.ok();
                    return Err(StepError::TimedOut {
                        command: command_line,
                        timeout_secs: spec.timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await
        };
        let status = waited.map_err(|source| StepError::Launch {
            command: command_line.clone(),
            source,
        })?;

        let result = CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout_task.await.unwrap_or_default(),
            stderr: stderr_task.await.unwrap_or_default(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if !result.success() {
            warn!(
                command = %command_line,
                exit_code = result.exit_code,
                stderr = %tail(&result.stderr, FAILURE_TAIL_LINES),
                "Command failed"
            );
            return Err(StepError::NonZeroExit {
                command: command_line,
                code: result.exit_code,
            });
        }
        debug!(command = %command_line, duration_ms = result.duration_ms, "Command finished");
        Ok(result)
    }
}

/// Log every line of `pipe` at info as it arrives and return the last
/// [`OUTPUT_TAIL_LINES`] of them. Invalid UTF-8 is replaced, not fatal, so
/// the pipe is always drained.
async fn forward_lines<R>(pipe: Option<R>, program: String, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut reader = BufReader::new(pipe);
    let mut kept: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        info!(command = %program, stream, "{}", line);
        if kept.len() == OUTPUT_TAIL_LINES {
            kept.pop_front();
        }
        kept.push_back(line);
    }
    Vec::from(kept).join("\n")
}

/// Last `lines` lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
