//! Job script templates.
//!
//! Rendering goes through the narrow [`TemplateEngine`] trait so the
//! orchestration never depends on a particular template syntax. The shipped
//! engine wraps minijinja with strict undefined handling: a template that
//! references a variable outside [`TemplateBindings`] fails instead of
//! silently rendering an empty string.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use tracing::debug;

use crate::core::scheduler::SchedulerOptions;
use crate::core::value::ArgValue;
use crate::error::{SubmitError, SubmitResult};
use crate::render::shell_quote;

/// Variables available to every job template.
///
/// Scheduler fields are flattened to the top level (`partition`, `nodes`,
/// `time_limit`, ...) and are `none` unless the mode is a scheduler backend
/// and the option was given.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateBindings {
    pub job_name: String,
    pub job_index: usize,
    pub run_id: String,
    pub mode: String,
    pub pykernel: String,
    pub script_path: String,
    pub script_args: IndexMap<String, ArgValue>,
    /// `--name value` pairs joined by spaces, values shell-quoted when needed.
    pub script_flags: String,
    pub script_file: String,
    pub log_path: String,
    pub log_dir: String,
    #[serde(flatten)]
    pub scheduler: SchedulerOptions,
}

/// Turns a template plus bindings into script text.
pub trait TemplateEngine {
    fn render(&self, template: &Path, bindings: &TemplateBindings) -> SubmitResult<String>;
}

/// Template engine wrapper around minijinja.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_filter("shell_quote", shell_quote_filter);
        Self { env }
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, template: &Path, bindings: &TemplateBindings) -> SubmitResult<String> {
        let source = fs::read_to_string(template).map_err(|err| {
            debug!(path = %template.display(), err = %err, "template unreadable");
            SubmitError::TemplateNotFound {
                path: template.to_path_buf(),
            }
        })?;
        self.env
            .render_str(&source, bindings)
            .map_err(|err| render_error(template, &err))
    }
}

fn render_error(template: &Path, err: &minijinja::Error) -> SubmitError {
    let mut reason = err.to_string();
    if let Some(detail) = err.detail()
        && !reason.contains(detail)
    {
        reason.push_str(&format!(" ({detail})"));
    }
    SubmitError::TemplateRenderError {
        path: PathBuf::from(template),
        reason,
    }
}

fn shell_quote_filter(value: &Value) -> String {
    match value.as_str() {
        Some(s) => shell_quote(s),
        None => shell_quote(&value.to_string()),
    }
}
