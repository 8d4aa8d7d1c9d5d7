//! Helpers for running child processes with timeouts and bounded output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to a child process.
#[derive(Debug, Clone)]
pub struct CommandLimits {
    /// Maximum time before killing the command.
    pub timeout: Duration,
    /// Maximum bytes kept in memory per stream.
    pub output_limit_bytes: usize,
    /// When set, both streams are appended line by line to this file as they
    /// arrive, so long-running commands can be followed.
    pub tee_path: Option<PathBuf>,
}

impl CommandLimits {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
            tee_path: None,
        }
    }

    pub fn with_tee(mut self, path: impl Into<PathBuf>) -> Self {
        self.tee_path = Some(path.into());
        self
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Total bytes the child wrote to stderr, including truncated bytes.
    pub fn stderr_bytes(&self) -> usize {
        self.stderr.len() + self.stderr_truncated
    }

    /// True if stderr carried anything besides whitespace.
    ///
    /// Truncated bytes count as output: they were only dropped for memory.
    pub fn wrote_stderr(&self) -> bool {
        self.stderr_truncated > 0 || self.stderr.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// True if the process exited with status 0 within its timeout.
    #[cfg(test)]
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

type SharedTee = Arc<Option<Mutex<BufWriter<File>>>>;

/// How long output readers may drain after the process group is killed.
const READER_GRACE: Duration = Duration::from_secs(2);
const READER_POLL: Duration = Duration::from_millis(20);

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), teeing = limits.tee_path.is_some()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    limits: &CommandLimits,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let tee: SharedTee = Arc::new(match &limits.tee_path {
        Some(path) => Some(Mutex::new(open_tee(path)?)),
        None => None,
    });

    // The child leads its own process group so a timeout also reaches
    // anything it spawned.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_tee = Arc::clone(&tee);
    let stderr_tee = Arc::clone(&tee);
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit, stdout_tee));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit, stderr_tee));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(limits.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    // Descendants may still hold the pipes open after the child exits.
    let readers = [&stdout_handle, &stderr_handle];
    let deadline = if timed_out {
        Some(Instant::now() + READER_GRACE)
    } else {
        started.checked_add(limits.timeout)
    };
    if !readers_finished(&readers, deadline) && !timed_out {
        warn!("command output still open at timeout, killing its process group");
        timed_out = true;
        kill_process_group(&mut child)?;
        readers_finished(&readers, Some(Instant::now() + READER_GRACE));
    }

    let (stdout, stdout_truncated) = collect_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = collect_output(stderr_handle).context("join stderr")?;
    let duration = started.elapsed();

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        duration,
    })
}

fn open_tee(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create log {}", path.display()))?;
    Ok(BufWriter::new(file))
}

type ReaderHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;

/// Wait until every reader hit end of stream, or `deadline` passes.
fn readers_finished(readers: &[&ReaderHandle], deadline: Option<Instant>) -> bool {
    loop {
        if readers.iter().all(|handle| handle.is_finished()) {
            return true;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
        thread::sleep(READER_POLL);
    }
}

/// Output of a finished reader. A reader still blocked on an escaped
/// descendant is abandoned with empty output.
fn collect_output(handle: ReaderHandle) -> Result<(Vec<u8>, usize)> {
    if !handle.is_finished() {
        warn!("output reader still blocked, abandoning it");
        return Ok((Vec::new(), 0));
    }
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(anyhow!("kill process group {pgid}: {err}")),
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Read a stream line by line with a size limit, optionally tee-ing to a file.
fn read_stream_limited<R: Read>(reader: R, limit: usize, tee: SharedTee) -> Result<(Vec<u8>, usize)> {
    let mut reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).context("read output")?;
        if n == 0 {
            break;
        }

        if let Some(mutex) = &*tee
            && let Ok(mut writer) = mutex.lock()
        {
            if let Err(e) = writer.write_all(&line) {
                warn!(err = %e, "failed to write to log file");
            } else if let Err(e) = writer.flush() {
                warn!(err = %e, "failed to flush log file");
            }
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}
