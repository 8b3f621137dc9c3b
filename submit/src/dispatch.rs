//! Hand rendered scripts to their backend.
//!
//! Both backends share the same file preparation: the target script must
//! exist, the rendered body is written next to its siblings and marked
//! executable, and the log directory is created. Local jobs are then spawned
//! in the background; scheduler jobs are submitted and the job id is parsed
//! from the submission output. Nothing here waits for a job to finish.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Backend;
use crate::core::types::{DispatchOutcome, DispatchResult};
use crate::error::{SubmitError, SubmitResult};
use crate::io::launcher::{Launcher, SpawnRequest, SubmitRequest};
use crate::render::RenderedScript;

/// Default bound on a single scheduler submission call.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

const LOG_RULE_WIDTH: usize = 80;

static PARSABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(;\S*)?$").expect("parsable regex"));
static SUBMITTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job (\d+)").expect("submitted regex"));

/// Outcome of one dispatch plus the local child handle, if any.
#[derive(Debug)]
pub struct Dispatched {
    pub result: DispatchResult,
    pub child: Option<Child>,
}

pub struct Dispatcher<'a, L: Launcher> {
    launcher: &'a L,
    workdir: PathBuf,
    submit_timeout: Duration,
}

impl<'a, L: Launcher> Dispatcher<'a, L> {
    pub fn new(launcher: &'a L, workdir: impl Into<PathBuf>, submit_timeout: Duration) -> Self {
        Self {
            launcher,
            workdir: workdir.into(),
            submit_timeout,
        }
    }

    /// Dispatch one rendered script. Failures are folded into the result.
    #[instrument(skip_all, fields(index = script.index, job = %script.job_name, backend = %script.backend))]
    pub fn dispatch(&self, script: &RenderedScript) -> Dispatched {
        let (outcome, child) = match self.try_dispatch(script) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(err = %err, "dispatch failed");
                (
                    DispatchOutcome::Failed {
                        reason: err.to_string(),
                    },
                    None,
                )
            }
        };
        if !outcome.is_failed() {
            info!(outcome = %outcome, log = %script.log_path.display(), "job dispatched");
        }
        Dispatched {
            result: DispatchResult {
                index: script.index,
                job_name: script.job_name.clone(),
                args: script.args.clone(),
                script_file: Some(script.script_file.clone()),
                log_path: Some(script.log_path.clone()),
                outcome,
            },
            child,
        }
    }

    fn try_dispatch(&self, script: &RenderedScript) -> SubmitResult<(DispatchOutcome, Option<Child>)> {
        self.prepare(script)?;
        match script.backend {
            Backend::Local => self.start_local(script),
            Backend::Slurm => self.submit_scheduled(script).map(|outcome| (outcome, None)),
        }
    }

    fn prepare(&self, script: &RenderedScript) -> SubmitResult<()> {
        let target = self.resolve(&script.target_script);
        if !target.is_file() {
            return Err(SubmitError::DispatchFailure(format!(
                "script not found: {}",
                target.display()
            )));
        }

        let script_file = self.resolve(&script.script_file);
        let log_path = self.resolve(&script.log_path);
        for path in [&script_file, &log_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| {
                    io_failure(&format!("create {}", parent.display()), &err)
                })?;
            }
        }
        fs::write(&script_file, &script.body)
            .map_err(|err| io_failure(&format!("write {}", script_file.display()), &err))?;
        make_executable(&script_file)?;
        debug!(script_file = %script_file.display(), log = %log_path.display(), "script written");
        Ok(())
    }

    fn start_local(&self, script: &RenderedScript) -> SubmitResult<(DispatchOutcome, Option<Child>)> {
        let log_path = self.resolve(&script.log_path);
        let command = format!("{} {}", script.shell, script.script_file.display());
        fs::write(&log_path, log_header(script, &command))
            .map_err(|err| io_failure(&format!("write {}", log_path.display()), &err))?;

        let process = self
            .launcher
            .spawn(&SpawnRequest {
                shell: script.shell.clone(),
                script_file: self.resolve(&script.script_file),
                log_path,
                workdir: self.workdir.clone(),
                env: script.env.clone(),
            })
            .map_err(|err| SubmitError::DispatchFailure(format!("{err:#}")))?;
        Ok((DispatchOutcome::Started { pid: process.pid }, process.child))
    }

    fn submit_scheduled(&self, script: &RenderedScript) -> SubmitResult<DispatchOutcome> {
        let mut args = vec![
            "--parsable".to_string(),
            format!("--job-name={}", script.job_name),
            format!("--output={}", self.resolve(&script.log_path).display()),
        ];
        args.extend(script.scheduler_args.iter().cloned());

        let output = self
            .launcher
            .submit(&SubmitRequest {
                command: script.submit_command.clone(),
                args,
                script_file: self.resolve(&script.script_file),
                workdir: self.workdir.clone(),
                timeout: self.submit_timeout,
            })
            .map_err(|err| SubmitError::DispatchFailure(format!("{err:#}")))?;

        if output.timed_out {
            return Err(SubmitError::DispatchFailure(format!(
                "{} timed out after {}s",
                script.submit_command,
                self.submit_timeout.as_secs()
            )));
        }
        if !output.success() {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Err(SubmitError::DispatchFailure(format!(
                "{} exited with {code}: {}",
                script.submit_command,
                output.stderr.trim()
            )));
        }
        match parse_job_id(&output.stdout) {
            Some(job_id) => Ok(DispatchOutcome::Submitted { job_id }),
            None => Err(SubmitError::DispatchFailure(format!(
                "could not parse job id from {} output: {}",
                script.submit_command,
                output.stdout.trim()
            ))),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

/// Extract a job id from `--parsable` output (`<id>[;cluster]`) or from the
/// human-readable `Submitted batch job <id>` line.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = PARSABLE_RE.captures(line) {
            return Some(caps[1].to_string());
        }
        if let Some(caps) = SUBMITTED_RE.captures(line) {
            return Some(caps[1].to_string());
        }
    }
    None
}

fn log_header(script: &RenderedScript, command: &str) -> String {
    format!(
        "Job Name: {}\nCommand: {command}\nMode: {}\nInterpreter: {}\n{}\n\n",
        script.job_name,
        script.mode,
        script.interpreter,
        "-".repeat(LOG_RULE_WIDTH)
    )
}

fn io_failure(action: &str, err: &std::io::Error) -> SubmitError {
    SubmitError::DispatchFailure(format!("{action}: {err}"))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> SubmitResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| io_failure(&format!("chmod {}", path.display()), &err))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> SubmitResult<()> {
    Ok(())
}
