//! Test-only doubles and a throwaway workspace for dispatch tests.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::config::ConfigModel;
use crate::core::layout::JobLayout;
use crate::core::scheduler::SchedulerOptions;
use crate::error::{SubmitError, SubmitResult};
use crate::io::config::load_config;
use crate::io::launcher::{Launcher, LocalProcess, SpawnRequest, SubmitOutput, SubmitRequest};
use crate::io::template::{TemplateBindings, TemplateEngine};
use crate::submit::JobRequest;

/// One call seen by [`RecordingLauncher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCall {
    Spawn {
        script_file: PathBuf,
        log_path: PathBuf,
        env: Vec<(String, String)>,
    },
    Submit {
        command: String,
        args: Vec<String>,
        script_file: PathBuf,
    },
}

impl LaunchCall {
    pub fn script_file(&self) -> &Path {
        match self {
            LaunchCall::Spawn { script_file, .. } | LaunchCall::Submit { script_file, .. } => {
                script_file
            }
        }
    }
}

/// Launcher that records calls instead of running anything.
///
/// Spawns get increasing fake pids; submissions get increasing job ids.
/// Calls whose script file name contains a `fail_on` needle fail.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    calls: RefCell<Vec<LaunchCall>>,
    counter: Cell<u32>,
    fail_on: Vec<String>,
}

impl RecordingLauncher {
    pub fn failing_on(needles: &[&str]) -> Self {
        Self {
            fail_on: needles.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<LaunchCall> {
        self.calls.borrow().clone()
    }

    fn next_id(&self) -> u32 {
        let id = self.counter.get() + 1;
        self.counter.set(id);
        1000 + id
    }

    fn should_fail(&self, script_file: &Path) -> bool {
        let name = script_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.fail_on.iter().any(|needle| name.contains(needle))
    }
}

impl Launcher for RecordingLauncher {
    fn spawn(&self, request: &SpawnRequest) -> Result<LocalProcess> {
        self.calls.borrow_mut().push(LaunchCall::Spawn {
            script_file: request.script_file.clone(),
            log_path: request.log_path.clone(),
            env: request.env.clone(),
        });
        if self.should_fail(&request.script_file) {
            return Err(anyhow!("spawn refused for {}", request.script_file.display()));
        }
        Ok(LocalProcess {
            pid: self.next_id(),
            child: None,
        })
    }

    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutput> {
        self.calls.borrow_mut().push(LaunchCall::Submit {
            command: request.command.clone(),
            args: request.args.clone(),
            script_file: request.script_file.clone(),
        });
        if self.should_fail(&request.script_file) {
            return Ok(SubmitOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "sbatch: error: Batch job submission failed".to_string(),
                timed_out: false,
            });
        }
        Ok(SubmitOutput {
            exit_code: Some(0),
            stdout: format!("{}\n", self.next_id()),
            stderr: String::new(),
            timed_out: false,
        })
    }
}

/// Engine that renders a fixed one-line body without reading templates.
#[derive(Debug, Default)]
pub struct StaticEngine {
    fail_on: Option<String>,
}

impl StaticEngine {
    /// Fail rendering for job names containing `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
        }
    }
}

impl TemplateEngine for StaticEngine {
    fn render(&self, template: &Path, bindings: &TemplateBindings) -> SubmitResult<String> {
        if let Some(needle) = &self.fail_on
            && bindings.job_name.contains(needle.as_str())
        {
            return Err(SubmitError::TemplateRenderError {
                path: template.to_path_buf(),
                reason: format!("refused {}", bindings.job_name),
            });
        }
        Ok(format!(
            "#!/bin/bash\n{} {} {}\n",
            bindings.pykernel, bindings.script_path, bindings.script_flags
        ))
    }
}

pub const LOCAL_TEMPLATE: &str = "#!/bin/bash\n{{ pykernel }} {{ script_path }} {{ script_flags }}\n";

pub const SLURM_TEMPLATE: &str = "#!/bin/bash\n\
{% if partition %}#SBATCH --partition={{ partition }}\n{% endif %}\
{{ pykernel }} {{ script_path }} {{ script_flags }}\n";

/// Config used by [`TestWorkspace::with_defaults`].
pub const DEFAULT_CONFIG: &str = r#"
[mode.local]
pykernel = "python3"
template = "templates/local.sh.j2"
shell = "sh"

[mode.slurm]
pykernel = "python3"
template = "templates/slurm.sh.j2"

[scripts.train]
path = "train.py"

[scripts.train.default_args]
lr = [0.1, 0.01]

[scripts.plain]
path = "plain.py"
"#;

/// Temporary directory laid out like a project using `submit`.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Workspace with [`DEFAULT_CONFIG`], both templates and both scripts.
    pub fn with_defaults() -> Result<Self> {
        let ws = Self::new()?;
        ws.write("submit/run.toml", DEFAULT_CONFIG)?;
        ws.write("templates/local.sh.j2", LOCAL_TEMPLATE)?;
        ws.write("templates/slurm.sh.j2", SLURM_TEMPLATE)?;
        ws.write("train.py", "print('train')\n")?;
        ws.write("plain.py", "print('plain')\n")?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Load `submit/run.toml` with template paths made absolute.
    pub fn config(&self) -> Result<ConfigModel> {
        let raw = fs::read_to_string(self.path("submit/run.toml"))?;
        let rooted = raw.replace(
            "template = \"",
            &format!("template = \"{}/", self.root().display()),
        );
        let path = self.write("submit/rooted.toml", &rooted)?;
        load_config(&path)
    }

    /// A request rooted in this workspace.
    pub fn request(&self, mode: &str, script: &str, overrides: &[(&str, &[&str])]) -> JobRequest {
        JobRequest {
            mode: mode.to_string(),
            script: script.to_string(),
            overrides: overrides
                .iter()
                .map(|(name, values)| {
                    (
                        name.to_string(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
            scheduler: SchedulerOptions::default(),
            layout: JobLayout::new(self.path(".submit/jobs"), self.path("logs"), "test_run"),
            workdir: self.root().to_path_buf(),
            max_jobs: None,
            submit_timeout: Duration::from_secs(5),
        }
    }
}
