//! Config file loading (`run.toml`).
//!
//! ```toml
//! [mode.local]
//! pykernel = "python"
//! template = "submit/templates/local.sh.j2"
//!
//! [mode.slurm]
//! pykernel = "singularity exec --nv image.sif python"
//! template = "submit/templates/slurm.sh.j2"
//!
//! [scripts.train]
//! path = "scripts/train.py"
//! default_args = { lr = [0.1, 0.01], epochs = 10 }
//! ```
//!
//! Key order is preserved so `default_args` expand in declaration order.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::config::{ConfigModel, RawConfig};

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./submit/run.toml";

/// Parse and validate a config document.
pub fn parse_config(contents: &str) -> Result<ConfigModel> {
    let raw: RawConfig = toml::from_str(contents).context("parse config toml")?;
    let model = ConfigModel::from_raw(raw)?;
    Ok(model)
}

/// Load config from a TOML file.
pub fn load_config(path: &Path) -> Result<ConfigModel> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("load {}", path.display()))
}
