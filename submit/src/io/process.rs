//! Running the submission command and waiting on dispatched jobs.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Output of a command that ran to completion or was killed at its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Run `cmd`, keeping at most `limit` bytes of each stream.
///
/// Both pipes are drained on their own threads so a chatty command cannot
/// block on a full pipe. A command still running at `timeout` is killed.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn capture_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    limit: usize,
) -> Result<CapturedOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn command")?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("stdout not piped"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("stderr not piped"))?;

    thread::scope(|scope| {
        let out = scope.spawn(|| drain(stdout, limit));
        let err = scope.spawn(|| drain(stderr, limit));

        let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => (status, false),
            None => {
                warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
                child.kill().context("kill command")?;
                (child.wait().context("reap command")?, true)
            }
        };

        let stdout = out.join().map_err(|_| anyhow!("stdout reader panicked"))??;
        let stderr = err.join().map_err(|_| anyhow!("stderr reader panicked"))??;
        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(CapturedOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out,
        })
    })
}

fn drain(stream: impl Read, limit: usize) -> Result<String> {
    let mut kept = Vec::new();
    let mut stream = stream.take(limit as u64);
    stream.read_to_end(&mut kept).context("read output")?;
    let dropped = io::copy(&mut stream.into_inner(), &mut io::sink()).context("drain output")?;
    if dropped > 0 {
        warn!(dropped, "command output truncated");
    }
    Ok(String::from_utf8_lossy(&kept).into_owned())
}

/// How a waited-on child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(Option<i32>),
    /// Still running when the timeout elapsed; the child is left alone.
    TimedOut,
}

impl WaitOutcome {
    pub fn success(self) -> bool {
        matches!(self, WaitOutcome::Exited(Some(0)))
    }
}

/// Wait for a child, optionally bounded by `timeout`.
///
/// Unlike [`capture_with_timeout`], a child that outlives the timeout is
/// not killed: once dispatched, a job's lifecycle is its own.
pub fn wait_child(child: &mut Child, timeout: Option<Duration>) -> Result<WaitOutcome> {
    let status = match timeout {
        Some(timeout) => child.wait_timeout(timeout).context("wait for job")?,
        None => Some(child.wait().context("wait for job")?),
    };
    Ok(match status {
        Some(status) => WaitOutcome::Exited(status.code()),
        None => WaitOutcome::TimedOut,
    })
}
