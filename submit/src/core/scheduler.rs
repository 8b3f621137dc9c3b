//! Scheduler resource options forwarded from the command line.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{SubmitError, SubmitResult};

static MEMORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?[KMGT]?$").expect("memory regex"));

// minutes | MM:SS | HH:MM:SS | D-HH | D-HH:MM | D-HH:MM:SS
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+-\d{1,2}(:\d{2}){0,2}|\d+(:\d{2}){0,2})$").expect("time regex")
});

/// Resource requests passed to the scheduler unchanged.
///
/// Every field is optional; unset fields are neither bound in templates nor
/// forwarded to the submission command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerOptions {
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub cpus_per_task: Option<u32>,
    pub mem_per_cpu: Option<String>,
    pub mem: Option<String>,
    pub gres: Option<String>,
    pub time_limit: Option<String>,
    pub constraint: Option<String>,
    pub exclude: Option<String>,
    pub mail_type: Option<String>,
    pub mail_user: Option<String>,
}

impl SchedulerOptions {
    pub fn is_empty(&self) -> bool {
        self == &SchedulerOptions::default()
    }

    pub fn validate(&self) -> SubmitResult<()> {
        let invalid = |msg: String| Err(SubmitError::InvalidSchedulerOption(msg));

        if self.mem.is_some() && self.mem_per_cpu.is_some() {
            return invalid("--mem and --mem-per-cpu are mutually exclusive".to_string());
        }
        for (flag, value) in [("--mem", &self.mem), ("--mem-per-cpu", &self.mem_per_cpu)] {
            if let Some(value) = value
                && !MEMORY_RE.is_match(value)
            {
                return invalid(format!("{flag} `{value}` is not a size like 8G or 13.4M"));
            }
        }
        if let Some(time) = &self.time_limit
            && !TIME_RE.is_match(time)
        {
            return invalid(format!(
                "--time `{time}` is not a duration like 90, 04:00:00 or 3-00:00:00"
            ));
        }
        if self.nodes == Some(0) {
            return invalid("--nodes must be > 0".to_string());
        }
        if self.cpus_per_task == Some(0) {
            return invalid("--cpus-per-task must be > 0".to_string());
        }
        if self.mail_type.is_some() && self.mail_user.is_none() {
            return invalid("--mail-type requires --mail-user".to_string());
        }
        Ok(())
    }

    /// Resource flags in `--name=value` form, in a fixed order.
    pub fn sbatch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(format!("--{flag}={value}"));
            }
        };
        push("partition", self.partition.clone());
        push("nodes", self.nodes.map(|n| n.to_string()));
        push("cpus-per-task", self.cpus_per_task.map(|n| n.to_string()));
        push("mem-per-cpu", self.mem_per_cpu.clone());
        push("mem", self.mem.clone());
        push("gres", self.gres.clone());
        push("time", self.time_limit.clone());
        push("constraint", self.constraint.clone());
        push("exclude", self.exclude.clone());
        push("mail-type", self.mail_type.clone());
        push("mail-user", self.mail_user.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate_and_forward_nothing() {
        let options = SchedulerOptions::default();
        options.validate().expect("valid");
        assert!(options.is_empty());
        assert!(options.sbatch_args().is_empty());
    }

    #[test]
    fn sbatch_args_follow_fixed_order() {
        let options = SchedulerOptions {
            partition: Some("gpu".to_string()),
            nodes: Some(2),
            gres: Some("gpu:1".to_string()),
            time_limit: Some("3-00:00:00".to_string()),
            ..SchedulerOptions::default()
        };
        options.validate().expect("valid");
        assert_eq!(
            options.sbatch_args(),
            vec![
                "--partition=gpu",
                "--nodes=2",
                "--gres=gpu:1",
                "--time=3-00:00:00"
            ]
        );
    }

    #[test]
    fn memory_options_are_exclusive_and_formatted() {
        let both = SchedulerOptions {
            mem: Some("8G".to_string()),
            mem_per_cpu: Some("4G".to_string()),
            ..SchedulerOptions::default()
        };
        assert!(both.validate().is_err());

        let bad = SchedulerOptions {
            mem_per_cpu: Some("lots".to_string()),
            ..SchedulerOptions::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("--mem-per-cpu"));

        let fractional = SchedulerOptions {
            mem_per_cpu: Some("13.4M".to_string()),
            ..SchedulerOptions::default()
        };
        fractional.validate().expect("valid");
    }

    #[test]
    fn time_accepts_slurm_formats() {
        for time in ["90", "30:00", "04:00:00", "2-12", "1-00:30", "3-00:00:00"] {
            let options = SchedulerOptions {
                time_limit: Some(time.to_string()),
                ..SchedulerOptions::default()
            };
            options.validate().expect(time);
        }
        let options = SchedulerOptions {
            time_limit: Some("tomorrow".to_string()),
            ..SchedulerOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn mail_type_requires_user() {
        let options = SchedulerOptions {
            mail_type: Some("END".to_string()),
            ..SchedulerOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
