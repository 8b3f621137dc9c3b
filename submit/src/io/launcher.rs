//! Process primitives behind dispatch.
//!
//! The [`Launcher`] trait decouples dispatch from the actual process and
//! scheduler calls. Tests use recording launchers that capture call order
//! without spawning anything.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::process::capture_with_timeout;

/// Bytes of scheduler output kept in memory.
pub const SUBMIT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Parameters for starting a local job.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Shell that runs the script file.
    pub shell: String,
    pub script_file: PathBuf,
    /// stdout and stderr are appended here.
    pub log_path: PathBuf,
    pub workdir: PathBuf,
    /// Extra environment for this instance only.
    pub env: Vec<(String, String)>,
}

/// Parameters for a scheduler submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub command: String,
    /// Flags placed before the script file.
    pub args: Vec<String>,
    pub script_file: PathBuf,
    pub workdir: PathBuf,
    pub timeout: Duration,
}

/// A started local job.
#[derive(Debug)]
pub struct LocalProcess {
    pub pid: u32,
    /// Handle for waiting; launchers that do not spawn real processes leave it empty.
    pub child: Option<Child>,
}

/// What the submission command printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl SubmitOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Abstraction over process spawning and scheduler submission.
pub trait Launcher {
    /// Start the script in the background and return immediately.
    fn spawn(&self, request: &SpawnRequest) -> Result<LocalProcess>;
    /// Run the submission command to completion and capture its output.
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutput>;
}

/// Launcher backed by real processes.
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    #[instrument(skip_all, fields(script = %request.script_file.display()))]
    fn spawn(&self, request: &SpawnRequest) -> Result<LocalProcess> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .with_context(|| format!("open log {}", request.log_path.display()))?;
        let log_err = log.try_clone().context("clone log handle")?;

        let child = Command::new(&request.shell)
            .arg(&request.script_file)
            .current_dir(&request.workdir)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .with_context(|| format!("spawn {} {}", request.shell, request.script_file.display()))?;

        let pid = child.id();
        debug!(pid, "local job spawned");
        Ok(LocalProcess {
            pid,
            child: Some(child),
        })
    }

    #[instrument(skip_all, fields(command = %request.command, script = %request.script_file.display()))]
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutput> {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .arg(&request.script_file)
            .current_dir(&request.workdir);

        let output = capture_with_timeout(cmd, request.timeout, SUBMIT_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run {}", request.command))?;
        Ok(SubmitOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
        })
    }
}
