//! Job names and per-instance file locations.
//!
//! Every instance of a request gets its own script file and log file:
//!
//! ```text
//! <jobs_dir>/<mode>/<run_id>/<index>-<job_name>.sh
//! <log_dir>/<mode>/<run_id>/<index>-<job_name>.out
//! ```
//!
//! The index makes siblings distinct; the job name ends with a digest of the
//! typed argument tuple so names stay distinct even after sanitizing and
//! truncation.

use std::path::PathBuf;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::core::value::ArgValue;

/// Longest human-readable part of a job name, before the digest.
pub const MAX_SLUG_LEN: usize = 96;

/// Short stable digest of an argument tuple (8 hex digits).
pub fn args_digest(args: &IndexMap<String, ArgValue>) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in args {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.kind().as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.to_string().as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

/// `<script>` for argument-less instances, otherwise
/// `<script>_<k>=<v>_..._<digest>`, restricted to `[A-Za-z0-9_.=-]`.
pub fn job_name(script: &str, args: &IndexMap<String, ArgValue>) -> String {
    if args.is_empty() {
        return sanitize(script);
    }
    let pairs: Vec<String> = args
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let mut slug = sanitize(&format!("{script}_{}", pairs.join("_")));
    slug.truncate(MAX_SLUG_LEN);
    format!("{slug}_{}", args_digest(args))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '=' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// File stem shared by an instance's script and log file.
pub fn file_stem(index: usize, job_name: &str) -> String {
    format!("{index:04}-{job_name}")
}

/// Root directories and run id for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub jobs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub run_id: String,
}

impl JobLayout {
    pub fn new(
        jobs_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            log_dir: log_dir.into(),
            run_id: run_id.into(),
        }
    }

    pub fn script_dir(&self, mode: &str) -> PathBuf {
        self.jobs_dir.join(mode).join(&self.run_id)
    }

    pub fn log_dir_for(&self, mode: &str) -> PathBuf {
        self.log_dir.join(mode).join(&self.run_id)
    }

    pub fn script_file(&self, mode: &str, stem: &str) -> PathBuf {
        self.script_dir(mode).join(format!("{stem}.sh"))
    }

    pub fn log_file(&self, mode: &str, stem: &str) -> PathBuf {
        self.log_dir_for(mode).join(format!("{stem}.out"))
    }
}
