//! Chains of external processes connected by pipes.
//!
//! A [`ProcessChain`] is the Rust equivalent of a shell pipeline run under `set -o pipefail`:
//! every stage's stdout feeds the next stage's stdin, and [`ProcessChain::wait`] fails if
//! *any* stage exits non-zero, not only the last one.
//!
//! ```text
//! ┌──────────┐   pipe   ┌──────────┐   pipe   ┌──────────┐
//! │ stage 0  │─────────>│ stage 1  │─────────>│ stage 2  │──> stdout
//! └──────────┘          └──────────┘          └──────────┘
//!      │ stderr              │ stderr              │ stderr
//!      └────────── drained by one thread per stage ─┘
//! ```
//!
//! Stderr of every stage is captured by a background thread, logged at `debug` level and
//! attached (last lines only) to the error of a failing stage. Dropping a chain kills and
//! reaps any stage that is still running, so no child outlives its owner.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::errors::{ExpressError, Result};
use crate::signals;

/// How often running chains are polled for completion and interruption.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Number of stderr lines kept per stage for error messages.
const STDERR_TAIL_LINES: usize = 10;

/// One running process of a chain.
struct Stage {
    name: String,
    child: Child,
    stderr: Option<JoinHandle<Vec<String>>>,
    status: Option<ExitStatus>,
}

impl Stage {
    fn stderr_tail(&mut self) -> Vec<String> {
        self.stderr.take().and_then(|handle| handle.join().ok()).unwrap_or_default()
    }
}

/// A running pipeline of external processes.
pub struct ProcessChain {
    stages: Vec<Stage>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl ProcessChain {
    /// Spawns `commands` connected stdout-to-stdin.
    ///
    /// `stdin` is attached to the first stage and `stdout` to the last. When either is
    /// [`Stdio::piped`], the handle is available through [`ProcessChain::take_stdin`] /
    /// [`ProcessChain::take_stdout`].
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if a stage cannot be spawned; stages already started are
    /// killed.
    pub fn spawn(commands: Vec<Command>, stdin: Stdio, stdout: Stdio) -> Result<Self> {
        if commands.is_empty() {
            return Err(ExpressError::pipeline("<empty>", "no commands to run"));
        }
        debug!("Running: {}", describe_chain(&commands));

        let mut chain =
            Self { stages: Vec::with_capacity(commands.len()), stdin: None, stdout: None };
        let last = commands.len() - 1;
        let mut next_stdin = Some(stdin);
        let mut final_stdout = Some(stdout);

        for (i, mut command) in commands.into_iter().enumerate() {
            let name = stage_name(&command);
            let input = match next_stdin.take() {
                Some(input) => input,
                None => {
                    let previous = chain
                        .stages
                        .last_mut()
                        .and_then(|stage| stage.child.stdout.take())
                        .ok_or_else(|| ExpressError::pipeline(&name, "upstream stdout missing"))?;
                    Stdio::from(previous)
                }
            };
            let output = if i == last {
                final_stdout.take().unwrap_or_else(Stdio::piped)
            } else {
                Stdio::piped()
            };

            let mut child = command
                .stdin(input)
                .stdout(output)
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| ExpressError::pipeline(&name, format!("could not be started: {e}")))?;

            if i == 0 {
                chain.stdin = child.stdin.take();
            }
            let stderr = child.stderr.take().map(|stream| drain_stderr(name.clone(), stream));
            chain.stages.push(Stage { name, child, stderr, status: None });
        }

        chain.stdout = chain.stages.last_mut().and_then(|stage| stage.child.stdout.take());
        Ok(chain)
    }

    /// Spawns a single command.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if the command cannot be spawned.
    pub fn spawn_one(command: Command, stdin: Stdio, stdout: Stdio) -> Result<Self> {
        Self::spawn(vec![command], stdin, stdout)
    }

    /// Takes the write end of the first stage's stdin, if it was piped.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Takes the read end of the last stage's stdout, if it was piped.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Waits for every stage and fails if any of them did not exit successfully.
    ///
    /// Untaken stdin/stdout handles are closed first so stages can observe EOF.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressError::Pipeline`] naming the first failing stage, or
    /// [`ExpressError::Interrupted`] if a termination signal arrived while waiting (in which
    /// case all stages are killed).
    pub fn wait(mut self) -> Result<()> {
        self.stdin = None;
        self.stdout = None;
        self.wait_all()?;

        let mut failures = Vec::new();
        for stage in &mut self.stages {
            let tail = stage.stderr_tail();
            let Some(status) = stage.status else { continue };
            if !status.success() {
                let mut reason = describe_status(status);
                if !tail.is_empty() {
                    reason.push_str(": ");
                    reason.push_str(&tail.join(" | "));
                }
                failures.push(if status.signal() == Some(libc::SIGPIPE) {
                    ExpressError::broken_pipe(&stage.name, reason)
                } else {
                    ExpressError::pipeline(&stage.name, reason)
                });
            }
        }

        // A writer killed by SIGPIPE is a symptom; report the stage that stopped reading.
        failures.sort_by_key(ExpressError::is_broken_pipe);
        match failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Kills every stage that is still running and reaps all of them, ignoring statuses.
    ///
    /// Used when a consumer has read everything it needs from a producer.
    pub fn terminate(mut self) {
        self.stdin = None;
        self.stdout = None;
        self.kill_running();
    }

    /// Polls all stages until they have exited.
    fn wait_all(&mut self) -> Result<()> {
        loop {
            let mut running = false;
            for stage in &mut self.stages {
                if stage.status.is_some() {
                    continue;
                }
                match stage.child.try_wait() {
                    Ok(Some(status)) => stage.status = Some(status),
                    Ok(None) => running = true,
                    Err(e) => {
                        let reason = format!("wait failed: {e}");
                        return Err(ExpressError::pipeline(&stage.name, reason));
                    }
                }
            }
            if !running {
                return Ok(());
            }
            if signals::interrupted() {
                self.kill_running();
                return Err(ExpressError::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill_running(&mut self) {
        for stage in &mut self.stages {
            if stage.status.is_none() {
                let _ = stage.child.kill();
                stage.status = stage.child.wait().ok();
            }
            stage.stderr.take();
        }
    }
}

impl Drop for ProcessChain {
    fn drop(&mut self) {
        self.stdin = None;
        self.stdout = None;
        self.kill_running();
    }
}

/// Runs one command to completion, discarding its stdout.
///
/// # Errors
///
/// Returns a pipeline error if the command cannot be started or exits non-zero.
pub fn run(command: Command) -> Result<()> {
    ProcessChain::spawn_one(command, Stdio::null(), Stdio::null())?.wait()
}

/// Runs one command to completion and returns its stdout as text.
///
/// # Errors
///
/// Returns a pipeline error if the command cannot be started, exits non-zero, or writes
/// output that is not valid UTF-8.
pub fn run_capture(command: Command) -> Result<String> {
    let name = stage_name(&command);
    let mut chain = ProcessChain::spawn_one(command, Stdio::null(), Stdio::piped())?;
    let mut text = String::new();
    if let Some(mut stdout) = chain.take_stdout() {
        stdout
            .read_to_string(&mut text)
            .map_err(|e| ExpressError::pipeline(&name, format!("reading output failed: {e}")))?;
    }
    chain.wait()?;
    Ok(text)
}

/// Short name of a command for diagnostics: program file name plus a leading subcommand.
#[must_use]
pub fn stage_name(command: &Command) -> String {
    let program = Path::new(command.get_program())
        .file_name()
        .map_or_else(|| command.get_program().to_string_lossy(), OsStr::to_string_lossy)
        .into_owned();
    match command.get_args().next().map(OsStr::to_string_lossy) {
        Some(arg) if !arg.starts_with('-') && !arg.contains('/') => format!("{program} {arg}"),
        _ => program,
    }
}

/// Full command line of a command, for logging.
#[must_use]
pub fn describe_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_chain(commands: &[Command]) -> String {
    commands.iter().map(describe_command).collect::<Vec<_>>().join(" | ")
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "terminated abnormally".to_string(),
    }
}

fn drain_stderr(name: String, stream: impl Read + Send + 'static) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            debug!("[{name}] {line}");
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into()
    })
}
