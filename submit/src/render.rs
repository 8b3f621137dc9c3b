//! Rendering one job instance into a backend-specific script.

use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::core::config::Backend;
use crate::core::grid::JobInstance;
use crate::core::layout::{JobLayout, file_stem, job_name};
use crate::core::scheduler::SchedulerOptions;
use crate::core::value::ArgValue;
use crate::error::SubmitResult;
use crate::io::template::{TemplateBindings, TemplateEngine};

/// A complete script body plus everything dispatch needs to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub index: usize,
    pub job_name: String,
    pub args: Vec<(String, String)>,
    pub body: String,
    pub mode: String,
    pub backend: Backend,
    /// Interpreter invocation the template was rendered with.
    pub interpreter: String,
    pub shell: String,
    pub submit_command: String,
    /// The user script the job runs.
    pub target_script: PathBuf,
    /// Where the rendered body is written.
    pub script_file: PathBuf,
    pub log_path: PathBuf,
    /// Resource flags forwarded to the submission command.
    pub scheduler_args: Vec<String>,
    /// Environment exported to this instance only.
    pub env: Vec<(String, String)>,
}

/// Binds job instances to the mode template.
///
/// Holds only borrowed, request-wide inputs; every call is independent.
pub struct Renderer<'a, T: TemplateEngine> {
    engine: &'a T,
    layout: &'a JobLayout,
    scheduler: &'a SchedulerOptions,
}

impl<'a, T: TemplateEngine> Renderer<'a, T> {
    pub fn new(engine: &'a T, layout: &'a JobLayout, scheduler: &'a SchedulerOptions) -> Self {
        Self {
            engine,
            layout,
            scheduler,
        }
    }

    #[instrument(skip_all, fields(index = instance.index, mode = %instance.mode.name))]
    pub fn render(&self, instance: &JobInstance<'_>) -> SubmitResult<RenderedScript> {
        let mode = instance.mode;
        let script = instance.script;
        let job_name = job_name(&script.name, &instance.args);
        let stem = file_stem(instance.index, &job_name);
        let script_file = self.layout.script_file(&mode.name, &stem);
        let log_path = self.layout.log_file(&mode.name, &stem);
        let log_dir = self.layout.log_dir_for(&mode.name);

        let scheduler = if mode.backend.is_scheduler() {
            self.scheduler.clone()
        } else {
            SchedulerOptions::default()
        };

        let bindings = TemplateBindings {
            job_name: job_name.clone(),
            job_index: instance.index,
            run_id: self.layout.run_id.clone(),
            mode: mode.name.clone(),
            pykernel: mode.pykernel.clone(),
            script_path: script.path.display().to_string(),
            script_args: instance.args.clone(),
            script_flags: script_flags(&instance.args),
            script_file: script_file.display().to_string(),
            log_path: log_path.display().to_string(),
            log_dir: log_dir.display().to_string(),
            scheduler,
        };
        let body = self.engine.render(&mode.template, &bindings)?;
        debug!(job_name = %job_name, bytes = body.len(), "rendered job script");

        let env = vec![
            ("SUBMIT_JOB_NAME".to_string(), job_name.clone()),
            ("SUBMIT_JOB_INDEX".to_string(), instance.index.to_string()),
            ("SUBMIT_RUN_ID".to_string(), self.layout.run_id.clone()),
            ("SUBMIT_LOG_PATH".to_string(), log_path.display().to_string()),
        ];

        Ok(RenderedScript {
            index: instance.index,
            job_name,
            args: instance.labels(),
            body,
            mode: mode.name.clone(),
            backend: mode.backend,
            interpreter: mode.pykernel.clone(),
            shell: mode.shell.clone(),
            submit_command: mode.submit_command.clone(),
            target_script: script.path.clone(),
            script_file,
            log_path,
            scheduler_args: bindings.scheduler.sbatch_args(),
            env,
        })
    }
}

/// Format arguments as `--name value` pairs for a command line.
pub fn script_flags(args: &IndexMap<String, ArgValue>) -> String {
    args.iter()
        .map(|(name, value)| format!("--{name} {}", shell_quote(&value.to_string())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote `raw` for a POSIX shell unless it only has safe characters.
pub fn shell_quote(raw: &str) -> String {
    let safe = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}
