//! In-memory configuration model: execution modes and script entries.
//!
//! The model is built once per invocation from an already-parsed mapping (see
//! [`crate::io::config`] for the TOML loader) and then only queried.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::value::ArgValue;
use crate::error::{SubmitError, SubmitResult};

/// Execution backend behind a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Run the rendered script as a local child process.
    Local,
    /// Submit the rendered script to Slurm.
    Slurm,
}

impl Backend {
    /// Backend implied by a mode name when the config does not say.
    pub fn infer(mode_name: &str) -> Backend {
        match mode_name {
            "slurm" => Backend::Slurm,
            _ => Backend::Local,
        }
    }

    pub fn is_scheduler(self) -> bool {
        matches!(self, Backend::Slurm)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Slurm => f.write_str("slurm"),
        }
    }
}

/// A mode block as written in the config. Required fields are checked lazily
/// by [`ConfigModel::resolve_mode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMode {
    pub pykernel: Option<String>,
    pub template: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub shell: Option<String>,
    pub submit_command: Option<String>,
}

/// A default argument written either as a scalar or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValues {
    Many(Vec<ArgValue>),
    One(ArgValue),
}

impl DefaultValues {
    fn into_vec(self) -> Vec<ArgValue> {
        match self {
            DefaultValues::Many(values) => values,
            DefaultValues::One(value) => vec![value],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawScript {
    pub path: PathBuf,
    #[serde(default)]
    pub default_args: Option<IndexMap<String, DefaultValues>>,
}

/// Parsed configuration document: `mode -> {..}` and `scripts -> {..}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub mode: IndexMap<String, RawMode>,
    #[serde(default)]
    pub scripts: IndexMap<String, RawScript>,
}

/// One runnable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    pub name: String,
    pub path: PathBuf,
    /// Argument name -> non-empty candidate values, in declaration order.
    pub default_args: IndexMap<String, Vec<ArgValue>>,
}

/// A fully resolved execution mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeConfig {
    pub name: String,
    pub pykernel: String,
    pub template: PathBuf,
    pub backend: Backend,
    /// Shell used to launch local scripts.
    pub shell: String,
    /// Scheduler submission command.
    pub submit_command: String,
}

pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_SUBMIT_COMMAND: &str = "sbatch";

/// Read-only lookup surface over the configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigModel {
    modes: IndexMap<String, RawMode>,
    scripts: IndexMap<String, ScriptEntry>,
}

impl ConfigModel {
    /// Build the model, normalizing scalar defaults to one-element sequences.
    ///
    /// Rejects empty script paths and empty default sequences; mode blocks are
    /// validated on lookup so an incomplete mode only matters when it is used.
    pub fn from_raw(raw: RawConfig) -> SubmitResult<Self> {
        let mut scripts = IndexMap::with_capacity(raw.scripts.len());
        for (name, script) in raw.scripts {
            if script.path.as_os_str().is_empty() {
                return Err(SubmitError::InvalidConfig(format!(
                    "scripts.{name}.path must not be empty"
                )));
            }
            let mut default_args = IndexMap::new();
            for (arg, values) in script.default_args.unwrap_or_default() {
                let values = values.into_vec();
                if values.is_empty() {
                    return Err(SubmitError::InvalidConfig(format!(
                        "scripts.{name}.default_args.{arg} must not be empty"
                    )));
                }
                default_args.insert(arg, values);
            }
            scripts.insert(
                name.clone(),
                ScriptEntry {
                    name,
                    path: script.path,
                    default_args,
                },
            );
        }
        Ok(Self {
            modes: raw.mode,
            scripts,
        })
    }

    pub fn resolve(&self, script_name: &str) -> SubmitResult<&ScriptEntry> {
        self.scripts
            .get(script_name)
            .ok_or_else(|| SubmitError::UnknownScript {
                name: script_name.to_string(),
                available: join_names(self.scripts.keys()),
            })
    }

    pub fn resolve_mode(&self, mode_name: &str) -> SubmitResult<ModeConfig> {
        let raw = self
            .modes
            .get(mode_name)
            .ok_or_else(|| SubmitError::UnknownMode {
                name: mode_name.to_string(),
                reason: format!("not configured (configured: {})", join_names(self.modes.keys())),
            })?;
        let missing = |field: &str| SubmitError::UnknownMode {
            name: mode_name.to_string(),
            reason: format!("missing required field `{field}`"),
        };
        let pykernel = raw
            .pykernel
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| missing("pykernel"))?;
        let template = raw
            .template
            .clone()
            .filter(|t| !t.as_os_str().is_empty())
            .ok_or_else(|| missing("template"))?;
        Ok(ModeConfig {
            name: mode_name.to_string(),
            pykernel,
            template,
            backend: raw.backend.unwrap_or_else(|| Backend::infer(mode_name)),
            shell: raw.shell.clone().unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            submit_command: raw
                .submit_command
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBMIT_COMMAND.to_string()),
        })
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.map(String::as_str).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
