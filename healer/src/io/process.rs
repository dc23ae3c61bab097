//! Helpers for running child processes with timeouts, cancellation and
//! bounded output.
//!
//! Every child is placed in its own process group so that a timeout or
//! cancellation kills the whole tree (including backgrounded grandchildren),
//! not only the direct child.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::exit_codes;

/// How often a waiting child is checked against the cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Why a child stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child exited (or was killed by an outside signal) on its own.
    Exited(ExitStatus),
    /// The deadline passed and the process group was killed.
    TimedOut,
    /// The cancel token fired and the process group was killed.
    Cancelled,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    /// Exit code in shell convention: signals map to `128 + signo`, timeouts
    /// to 124 and cancellation to 130.
    pub fn exit_code(&self) -> i32 {
        match self.termination {
            Termination::Exited(status) => status_code(status),
            Termination::TimedOut => exit_codes::TIMEOUT,
            Termination::Cancelled => exit_codes::CANCELLED,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        text
    }

    pub fn stderr_lossy(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }
}

#[cfg(unix)]
fn status_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signo| exit_codes::SIGNAL_BASE + signo))
        .unwrap_or(exit_codes::FAILURE)
}

#[cfg(not(unix))]
fn status_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(exit_codes::FAILURE)
}

/// Build a `sh -c <command>` invocation.
pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// Returns `Err` only if the child could not be spawned or waited on; a timeout or a
/// cancellation is reported through [`Termination`].
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let termination = wait_or_kill(&mut child, timeout, cancel)?;
    if let Termination::Exited(_) = termination {
        // Backgrounded children may still hold the pipes open.
        kill_lingering_group(&child);
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(?termination, "command finished");
    Ok(CommandOutput {
        termination,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

/// Wait for `child` until it exits, the deadline passes, or `cancel` fires.
///
/// On timeout or cancellation the whole process group is killed and reaped
/// before returning, so no process from this command outlives the call.
fn wait_or_kill(child: &mut Child, timeout: Duration, cancel: &CancelToken) -> Result<Termination> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            warn!("command cancelled, killing process group");
            kill_process_tree(child)?;
            return Ok(Termination::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "command timed out, killing process group"
            );
            kill_process_tree(child)?;
            return Ok(Termination::TimedOut);
        }

        let slice = remaining.min(CANCEL_POLL_INTERVAL);
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            return Ok(Termination::Exited(status));
        }
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

/// Kill whatever is left in the group of an already reaped child.
#[cfg(unix)]
fn kill_lingering_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        Ok(()) => warn!("killed processes left behind by the command"),
        Err(Errno::ESRCH) => {}
        Err(errno) => debug!(%errno, "killpg of finished command failed"),
    }
}

#[cfg(not(unix))]
fn kill_lingering_group(_child: &Child) {}

/// Kill the child's process group (or just the child off unix) and reap it.
fn kill_process_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(errno) = killpg(pgid, Signal::SIGKILL) {
            debug!(%errno, "killpg failed, falling back to direct kill");
            child.kill().ok();
        }
    }
    #[cfg(not(unix))]
    {
        child.kill().ok();
    }
    child.wait().context("wait command after kill")?;
    Ok(())
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
