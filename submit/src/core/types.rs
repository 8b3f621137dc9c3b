//! Shared deterministic types for dispatch outcomes and instance lifecycle.
//!
//! These types are produced once per job instance and never mutated
//! afterwards; the report and the exit code are derived from them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Terminal outcome of handing one instance to its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Accepted by the scheduler.
    Submitted { job_id: String },
    /// Running as a local child process.
    Started { pid: u32 },
    /// Not running; `reason` is always human-readable.
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DispatchOutcome::Failed { .. })
    }

    pub fn phase(&self) -> JobPhase {
        match self {
            DispatchOutcome::Submitted { .. } => JobPhase::Submitted,
            DispatchOutcome::Started { .. } => JobPhase::Started,
            DispatchOutcome::Failed { .. } => JobPhase::Failed,
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Submitted { job_id } => write!(f, "submitted job_id={job_id}"),
            DispatchOutcome::Started { pid } => write!(f, "started pid={pid}"),
            DispatchOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-instance result in grid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub index: usize,
    pub job_name: String,
    /// Argument tuple as `(name, value)` pairs, in table order.
    pub args: Vec<(String, String)>,
    pub script_file: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// Lifecycle of one job instance.
///
/// `Pending -> Rendered -> {Submitted | Started | Failed}`, with a direct
/// `Pending -> Failed` edge for instances that never render. Terminal phases
/// have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Rendered,
    Submitted,
    Started,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Submitted | JobPhase::Started | JobPhase::Failed
        )
    }

    pub fn can_advance_to(self, next: JobPhase) -> bool {
        matches!(
            (self, next),
            (JobPhase::Pending, JobPhase::Rendered)
                | (JobPhase::Pending, JobPhase::Failed)
                | (JobPhase::Rendered, JobPhase::Submitted)
                | (JobPhase::Rendered, JobPhase::Started)
                | (JobPhase::Rendered, JobPhase::Failed)
        )
    }

    /// Move to `next`, refusing any edge not in the lifecycle.
    pub fn advance(self, next: JobPhase) -> Result<JobPhase, String> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(format!("illegal job transition {self:?} -> {next:?}"))
        }
    }
}
