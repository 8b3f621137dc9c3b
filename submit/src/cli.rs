//! Command-line surface for `submit`.
//!
//! Known flags are parsed by clap. Everything else is a free-form argument
//! override: `--name v1 v2 ...` collects values until the next `--` token, so
//! the command line is split before clap sees it.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use tracing::{debug, warn};

use crate::core::grid::ArgumentOverrides;
use crate::core::layout::JobLayout;
use crate::core::scheduler::SchedulerOptions;
use crate::dispatch::DEFAULT_SUBMIT_TIMEOUT;
use crate::exit_codes;
use crate::io::config::{DEFAULT_CONFIG_PATH, load_config};
use crate::io::launcher::SystemLauncher;
use crate::io::process::{WaitOutcome, wait_child};
use crate::io::template::JinjaEngine;
use crate::report::{write_json, write_plan, write_summary};
use crate::submit::{JobRequest, SubmitReport, plan_jobs};

#[derive(Debug, Parser)]
#[command(
    name = "submit",
    version,
    about = "Expand an argument grid into jobs and run them locally or through Slurm",
    after_help = "Any other `--name v1 v2 ...` overrides the script argument `name`; \
                  several values expand into one job per combination."
)]
pub struct Cli {
    /// Script entry to run, as named in the config.
    #[arg(long)]
    pub script: String,

    #[arg(long = "config_file", alias = "config-file", default_value = DEFAULT_CONFIG_PATH)]
    pub config_file: PathBuf,

    /// Execution mode, as named in the config.
    #[arg(long, default_value = "local")]
    pub mode: String,

    #[arg(long)]
    pub partition: Option<String>,
    #[arg(long)]
    pub nodes: Option<u32>,
    #[arg(long)]
    pub cpus_per_task: Option<u32>,
    /// Memory per CPU, e.g. 4G.
    #[arg(long)]
    pub mem_per_cpu: Option<String>,
    /// Memory per node, e.g. 32G.
    #[arg(long)]
    pub mem: Option<String>,
    /// Generic resources, e.g. gpu:1.
    #[arg(long)]
    pub gres: Option<String>,
    /// Time limit, e.g. 3-00:00:00.
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub constraint: Option<String>,
    /// Nodes to exclude.
    #[arg(long)]
    pub exclude: Option<String>,
    #[arg(long)]
    pub mail_type: Option<String>,
    #[arg(long)]
    pub mail_user: Option<String>,

    /// Root directory for job logs.
    #[arg(long, alias = "slurm_log_dir", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Root directory for rendered job scripts.
    #[arg(long, default_value = "./.submit/jobs")]
    pub jobs_dir: PathBuf,

    /// Refuse to dispatch grids with more jobs than this.
    #[arg(long)]
    pub max_jobs: Option<usize>,

    /// Bound on each scheduler submission call.
    #[arg(long, default_value_t = DEFAULT_SUBMIT_TIMEOUT.as_secs())]
    pub submit_timeout_secs: u64,

    /// Wait for local jobs to exit and fail if any of them fails.
    #[arg(long)]
    pub wait: bool,

    /// Stop waiting after this many seconds; jobs keep running.
    #[arg(long, requires = "wait")]
    pub wait_timeout_secs: Option<u64>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            partition: self.partition.clone(),
            nodes: self.nodes,
            cpus_per_task: self.cpus_per_task,
            mem_per_cpu: self.mem_per_cpu.clone(),
            mem: self.mem.clone(),
            gres: self.gres.clone(),
            time_limit: self.time.clone(),
            constraint: self.constraint.clone(),
            exclude: self.exclude.clone(),
            mail_type: self.mail_type.clone(),
            mail_user: self.mail_user.clone(),
        }
    }
}

/// Split `args` (program name first) into clap-known tokens and overrides.
///
/// A known flag that takes a value consumes the next token unless written as
/// `--flag=value`. Unknown `--name` tokens collect following tokens up to the
/// next `--` token; `--name=value` starts the list with `value`. A repeated
/// override name keeps its first position and its last values.
pub fn split_known_args(args: &[String]) -> Result<(Vec<String>, ArgumentOverrides)> {
    let known_flags = known_flags();
    let mut known = Vec::with_capacity(args.len());
    let mut overrides = ArgumentOverrides::new();
    let mut tokens = args.iter().peekable();

    if let Some(program) = tokens.next() {
        known.push(program.clone());
    }

    while let Some(token) = tokens.next() {
        let Some(body) = token.strip_prefix("--") else {
            if token.starts_with('-') && token.len() > 1 {
                // short flags (-h, -V) are clap's to judge
                known.push(token.clone());
                continue;
            }
            bail!("unexpected argument `{token}`; overrides look like `--name value ...`");
        };
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };

        if let Some(&takes_value) = known_flags.get(name) {
            known.push(token.clone());
            if takes_value
                && inline.is_none()
                && let Some(value) = tokens.next_if(|next| !is_long_flag(next))
            {
                known.push(value.clone());
            }
            continue;
        }

        if name.is_empty() {
            bail!("unexpected argument `{token}`");
        }
        let mut values: Vec<String> = inline.map(str::to_string).into_iter().collect();
        while let Some(value) = tokens.next_if(|next| !is_long_flag(next)) {
            values.push(value.clone());
        }
        if values.is_empty() {
            bail!("no values provided for argument --{name}");
        }
        overrides.insert(name.to_string(), values);
    }

    Ok((known, overrides))
}

fn is_long_flag(token: &str) -> bool {
    token.starts_with("--")
}

/// Long flag names and aliases clap knows, with whether each takes a value.
fn known_flags() -> HashMap<String, bool> {
    let mut command = Cli::command();
    command.build();
    let mut flags = HashMap::new();
    for arg in command.get_arguments() {
        let takes_value = arg.get_action().takes_values();
        if let Some(long) = arg.get_long() {
            flags.insert(long.to_string(), takes_value);
        }
        for alias in arg.get_all_aliases().unwrap_or_default() {
            flags.insert(alias.to_string(), takes_value);
        }
    }
    flags
}

/// Per-request run id: local time with milliseconds.
pub fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Parse `args`, run the request and return the process exit code.
pub fn run(args: &[String]) -> i32 {
    match run_inner(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    }
}

fn run_inner(args: &[String]) -> Result<i32> {
    let (known, overrides) = split_known_args(args)?;
    let cli = match Cli::try_parse_from(&known) {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            err.print().context("print usage")?;
            return Ok(code);
        }
    };
    debug!(?overrides, "parsed command line");

    let config = load_config(&cli.config_file)?;
    let request = JobRequest {
        mode: cli.mode.clone(),
        script: cli.script.clone(),
        overrides,
        scheduler: cli.scheduler_options(),
        layout: JobLayout::new(&cli.jobs_dir, &cli.log_dir, new_run_id()),
        workdir: std::env::current_dir().context("resolve working directory")?,
        max_jobs: cli.max_jobs,
        submit_timeout: Duration::from_secs(cli.submit_timeout_secs),
    };

    let plan = plan_jobs(&config, &request)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !cli.json {
        write_plan(&mut out, plan.total, &plan.table)?;
        out.flush()?;
    }

    let mut report = plan.execute(&JinjaEngine::new(), &SystemLauncher)?;
    let mut ok = report.all_ok();
    if cli.json {
        if cli.wait {
            ok &= wait_for_jobs(&mut report, cli.wait_timeout_secs, &mut io::sink())?;
        }
        write_json(&mut out, &report)?;
    } else {
        write_summary(&mut out, &report)?;
        out.flush()?;
        if cli.wait {
            ok &= wait_for_jobs(&mut report, cli.wait_timeout_secs, &mut out)?;
        }
    }

    Ok(if ok {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

/// Wait for every started local job; true when all of them exited with 0.
///
/// Jobs still running at the deadline are left running and count as failures.
pub fn wait_for_jobs(
    report: &mut SubmitReport,
    timeout_secs: Option<u64>,
    out: &mut impl Write,
) -> Result<bool> {
    let deadline = timeout_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut all_ok = true;
    for job in &mut report.children {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let outcome = wait_child(&mut job.child, remaining)
            .with_context(|| format!("wait for {}", job.job_name))?;
        match outcome {
            WaitOutcome::Exited(Some(0)) => {
                writeln!(out, "[{:04}] {} exited with 0", job.index, job.job_name)?;
            }
            WaitOutcome::Exited(code) => {
                all_ok = false;
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                warn!(index = job.index, job = %job.job_name, %code, "job failed");
                writeln!(
                    out,
                    "[{:04}] {} exited with {code}, see {}",
                    job.index,
                    job.job_name,
                    job.log_path.display()
                )?;
            }
            WaitOutcome::TimedOut => {
                all_ok = false;
                warn!(index = job.index, job = %job.job_name, "job still running at wait deadline");
                writeln!(out, "[{:04}] {} still running", job.index, job.job_name)?;
            }
        }
    }
    Ok(all_ok)
}
