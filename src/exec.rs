// src/exec.rs

//! Child process execution with timeouts and process-group termination
//!
//! Build steps and smoke-test commands both go through [`run_command`]. The
//! child is placed in its own process group; on timeout or cancellation the
//! whole group is killed, so tools that fork helpers (compilers, linkers,
//! test harnesses) do not outlive the step.

use crate::error::{Error, Result};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How often a running child is checked for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared flag that asks running commands to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    TimedOut,
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit code {code}"),
            Termination::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Termination::TimedOut => f.write_str("timed out"),
            Termination::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Captured result of one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// `sh -c <command>` in `workdir`
pub fn shell(command: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workdir);
    cmd
}

/// Run a prepared command to completion, or until timeout or cancellation
///
/// stdin is always `/dev/null`; stdout and stderr are captured in full.
pub fn run_command(
    mut cmd: Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let started = Instant::now();

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| Error::IoError(format!("Failed to spawn {}: {}", program, e)))?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = started + timeout;
    let termination = loop {
        if cancel.is_cancelled() {
            kill_group(&mut child);
            break Termination::Cancelled;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("{} timed out after {}s, killing process group", program, timeout.as_secs());
            kill_group(&mut child);
            break Termination::TimedOut;
        }

        if let Some(status) = child.wait_timeout(remaining.min(POLL_INTERVAL))? {
            // Reap stray background jobs so they cannot hold the pipes open
            signal_group(&child, Signal::SIGKILL);
            break match status.code() {
                Some(code) => Termination::Exited(code),
                None => Termination::Signaled(status.signal().unwrap_or(0)),
            };
        }
    };

    let output = CommandOutput {
        termination,
        stdout: collect(stdout),
        stderr: collect(stderr),
        elapsed: started.elapsed(),
    };
    debug!("{} finished: {} in {:.1}s", program, output.termination, output.elapsed.as_secs_f64());
    Ok(output)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn signal_group(child: &Child, signal: Signal) {
    // The child leads its own group, so its pid is the group id
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, signal)
        && e != nix::errno::Errno::ESRCH
    {
        debug!("killpg({}) failed: {}", pgid, e);
    }
}

fn kill_group(child: &mut Child) {
    signal_group(child, Signal::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}
