//! Orchestration for one `submit` request.
//!
//! Planning resolves the script and mode, validates scheduler options and
//! builds the effective argument table; any error there is fatal and nothing
//! is written. Execution then walks the grid in order and renders and
//! dispatches each instance before moving to the next.

use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::config::{ConfigModel, ModeConfig, ScriptEntry};
use crate::core::grid::{ArgumentOverrides, EffectiveTable, GridPoint, expand};
use crate::core::layout::{JobLayout, job_name};
use crate::core::scheduler::SchedulerOptions;
use crate::core::types::{DispatchOutcome, DispatchResult, JobPhase};
use crate::core::value::ArgValue;
use crate::dispatch::Dispatcher;
use crate::error::{SubmitError, SubmitResult};
use crate::io::launcher::Launcher;
use crate::io::template::TemplateEngine;
use crate::render::Renderer;

/// Everything one invocation asks for.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub mode: String,
    pub script: String,
    pub overrides: ArgumentOverrides,
    pub scheduler: SchedulerOptions,
    pub layout: JobLayout,
    /// Directory jobs run in; relative paths resolve against it.
    pub workdir: PathBuf,
    /// Refuse grids larger than this.
    pub max_jobs: Option<usize>,
    pub submit_timeout: Duration,
}

/// A validated request, ready to expand and dispatch.
#[derive(Debug)]
pub struct JobPlan<'a> {
    pub script: &'a ScriptEntry,
    pub mode: ModeConfig,
    pub table: EffectiveTable,
    /// Number of instances the table expands to.
    pub total: usize,
    request: &'a JobRequest,
}

/// A local job still running when the report was built.
#[derive(Debug)]
pub struct RunningJob {
    pub index: usize,
    pub job_name: String,
    pub log_path: PathBuf,
    pub child: Child,
}

/// Per-instance results in grid order.
#[derive(Debug, Serialize)]
pub struct SubmitReport {
    pub run_id: String,
    pub mode: String,
    pub script: String,
    pub results: Vec<DispatchResult>,
    #[serde(skip)]
    pub children: Vec<RunningJob>,
}

impl SubmitReport {
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome.is_failed())
            .count()
    }

    pub fn all_ok(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Resolve and validate a request without touching the filesystem.
#[instrument(skip_all, fields(script = %request.script, mode = %request.mode))]
pub fn plan_jobs<'a>(config: &'a ConfigModel, request: &'a JobRequest) -> SubmitResult<JobPlan<'a>> {
    let script = config.resolve(&request.script)?;
    let mode = config.resolve_mode(&request.mode)?;
    if mode.backend.is_scheduler() {
        request.scheduler.validate()?;
    } else if !request.scheduler.is_empty() {
        warn!(mode = %mode.name, "scheduler options ignored for non-scheduler mode");
    }

    let table = EffectiveTable::build(script, &request.overrides);
    let limit = request.max_jobs.unwrap_or(usize::MAX);
    let total = match table.size() {
        Some(total) if total <= limit => total,
        Some(total) => {
            return Err(SubmitError::TooManyJobs {
                requested: total.to_string(),
                limit,
            });
        }
        None => {
            return Err(SubmitError::TooManyJobs {
                requested: format!("more than {}", usize::MAX),
                limit,
            });
        }
    };
    debug!(total, columns = table.columns().count(), "grid planned");

    Ok(JobPlan {
        script,
        mode,
        table,
        total,
        request,
    })
}

impl JobPlan<'_> {
    /// The grid points this plan dispatches, in order.
    pub fn instances(&self) -> Vec<GridPoint<'_>> {
        expand(&self.table, self.script, &self.mode)
    }

    /// Render and dispatch every instance sequentially.
    ///
    /// Instance-scoped errors become `Failed` results; processing continues.
    pub fn execute<T: TemplateEngine, L: Launcher>(
        &self,
        engine: &T,
        launcher: &L,
    ) -> SubmitResult<SubmitReport> {
        let request = self.request;
        let renderer = Renderer::new(engine, &request.layout, &request.scheduler);
        let dispatcher = Dispatcher::new(launcher, &request.workdir, request.submit_timeout);

        let mut results = Vec::with_capacity(self.total);
        let mut children = Vec::new();
        for point in self.instances() {
            let phase = JobPhase::Pending;
            let index = point.index();
            let instance = match point {
                GridPoint::Ready(instance) => instance,
                GridPoint::Rejected(rejected) => {
                    phase.advance(JobPhase::Failed).map_err(SubmitError::DispatchFailure)?;
                    warn!(index, err = %rejected.error, "instance rejected");
                    let name = label_job_name(&self.script.name, &rejected.labels);
                    results.push(failed(index, name, rejected.labels, &rejected.error));
                    continue;
                }
            };

            let rendered = match renderer.render(&instance) {
                Ok(rendered) => rendered,
                Err(err) => {
                    phase.advance(JobPhase::Failed).map_err(SubmitError::DispatchFailure)?;
                    warn!(index, err = %err, "render failed");
                    let name = job_name(&self.script.name, &instance.args);
                    results.push(failed(index, name, instance.labels(), &err));
                    continue;
                }
            };
            let phase = phase
                .advance(JobPhase::Rendered)
                .map_err(SubmitError::DispatchFailure)?;

            let dispatched = dispatcher.dispatch(&rendered);
            phase
                .advance(dispatched.result.outcome.phase())
                .map_err(SubmitError::DispatchFailure)?;
            if let Some(child) = dispatched.child {
                children.push(RunningJob {
                    index,
                    job_name: rendered.job_name.clone(),
                    log_path: rendered.log_path.clone(),
                    child,
                });
            }
            results.push(dispatched.result);
        }

        let report = SubmitReport {
            run_id: request.layout.run_id.clone(),
            mode: self.mode.name.clone(),
            script: self.script.name.clone(),
            results,
            children,
        };
        info!(
            total = report.results.len(),
            failed = report.failed_count(),
            "request finished"
        );
        Ok(report)
    }
}

/// Plan and execute in one call.
pub fn submit_job<T: TemplateEngine, L: Launcher>(
    config: &ConfigModel,
    request: &JobRequest,
    engine: &T,
    launcher: &L,
) -> SubmitResult<SubmitReport> {
    plan_jobs(config, request)?.execute(engine, launcher)
}

fn failed(
    index: usize,
    job_name: String,
    args: Vec<(String, String)>,
    err: &SubmitError,
) -> DispatchResult {
    DispatchResult {
        index,
        job_name,
        args,
        script_file: None,
        log_path: None,
        outcome: DispatchOutcome::Failed {
            reason: err.to_string(),
        },
    }
}

fn label_job_name(script: &str, labels: &[(String, String)]) -> String {
    let args: IndexMap<String, ArgValue> = labels
        .iter()
        .map(|(name, raw)| (name.clone(), ArgValue::String(raw.clone())))
        .collect();
    job_name(script, &args)
}
