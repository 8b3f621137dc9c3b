//! User-facing output: the plan summary and the per-instance report.

use std::io::Write;

use anyhow::{Context, Result};

use crate::core::grid::EffectiveTable;
use crate::submit::SubmitReport;

/// "Creating N job(s)" followed by each effective argument list.
pub fn write_plan(out: &mut impl Write, total: usize, table: &EffectiveTable) -> Result<()> {
    writeln!(out, "Creating {total} job(s) with the following parameters:")?;
    if table.is_empty() {
        writeln!(out, "  (no parameters specified)")?;
    }
    for (name, cells) in table.columns() {
        let values: Vec<String> = cells.iter().map(|cell| cell.label()).collect();
        writeln!(out, "  {name}: [{}]", values.join(", "))?;
    }
    writeln!(out)?;
    Ok(())
}

/// One line per instance with its argument tuple, then a count line.
pub fn write_summary(out: &mut impl Write, report: &SubmitReport) -> Result<()> {
    for result in &report.results {
        write!(
            out,
            "[{:04}] ({}) {} {}",
            result.index,
            args_tuple(&result.args),
            result.job_name,
            result.outcome
        )?;
        if let Some(log) = &result.log_path {
            write!(out, " log={}", log.display())?;
        }
        writeln!(out)?;
    }
    let failed = report.failed_count();
    let ok = report.results.len() - failed;
    if failed == 0 {
        writeln!(out, "Submitted {ok} job(s)")?;
    } else {
        writeln!(out, "Submitted {ok} job(s), {failed} failed")?;
    }
    Ok(())
}

fn args_tuple(args: &[(String, String)]) -> String {
    if args.is_empty() {
        return "no parameters".to_string();
    }
    args.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn write_json(out: &mut impl Write, report: &SubmitReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).context("serialize report")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use indexmap::IndexMap;
    use serde_json::Value;

    use super::*;
    use crate::core::config::ScriptEntry;
    use crate::core::grid::ArgumentOverrides;
    use crate::core::types::{DispatchOutcome, DispatchResult};
    use crate::core::value::ArgValue;

    fn report() -> SubmitReport {
        SubmitReport {
            run_id: "run".to_string(),
            mode: "slurm".to_string(),
            script: "train".to_string(),
            results: vec![
                DispatchResult {
                    index: 0,
                    job_name: "train_lr=0.1_aaaaaaaa".to_string(),
                    args: vec![("lr".to_string(), "0.1".to_string())],
                    script_file: Some(PathBuf::from("jobs/0000.sh")),
                    log_path: Some(PathBuf::from("logs/0000.out")),
                    outcome: DispatchOutcome::Submitted {
                        job_id: "42".to_string(),
                    },
                },
                DispatchResult {
                    index: 1,
                    job_name: "train_lr=x_bbbbbbbb".to_string(),
                    args: vec![("lr".to_string(), "x".to_string())],
                    script_file: None,
                    log_path: None,
                    outcome: DispatchOutcome::Failed {
                        reason: "bad value".to_string(),
                    },
                },
            ],
            children: Vec::new(),
        }
    }

    #[test]
    fn plan_lists_effective_values() {
        let mut defaults = IndexMap::new();
        defaults.insert(
            "lr".to_string(),
            vec![ArgValue::from("0.1"), ArgValue::from("0.01")],
        );
        let script = ScriptEntry {
            name: "train".to_string(),
            path: PathBuf::from("train.py"),
            default_args: defaults,
        };
        let mut overrides = ArgumentOverrides::new();
        overrides.insert("seed".to_string(), vec!["1".to_string(), "2".to_string()]);
        let table = EffectiveTable::build(&script, &overrides);

        let mut out = Vec::new();
        write_plan(&mut out, 4, &table).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "Creating 4 job(s) with the following parameters:\n  lr: [0.1, 0.01]\n  seed: [1, 2]\n\n"
        );
    }

    #[test]
    fn plan_without_parameters() {
        let mut out = Vec::new();
        write_plan(&mut out, 1, &EffectiveTable::default()).expect("write");
        assert!(String::from_utf8(out).expect("utf8").contains("(no parameters specified)"));
    }

    #[test]
    fn summary_has_a_line_per_instance() {
        let mut out = Vec::new();
        write_summary(&mut out, &report()).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[0000] (lr=0.1) train_lr=0.1_aaaaaaaa submitted job_id=42 log=logs/0000.out",
                "[0001] (lr=x) train_lr=x_bbbbbbbb failed: bad value",
                "Submitted 1 job(s), 1 failed",
            ]
        );
    }

    #[test]
    fn summary_shows_full_values_of_long_arguments() {
        let mut report = report();
        report.results.truncate(1);
        report.results[0].job_name = "train_data=_datasets_imagenet_tr_cccccccc".to_string();
        report.results[0].args = vec![
            ("data".to_string(), "/datasets/imagenet/train".to_string()),
            ("seed".to_string(), "1".to_string()),
        ];
        report.results.push(DispatchResult {
            index: 1,
            job_name: "plain".to_string(),
            args: Vec::new(),
            script_file: None,
            log_path: None,
            outcome: DispatchOutcome::Started { pid: 7 },
        });

        let mut out = Vec::new();
        write_summary(&mut out, &report).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("[0000] (data=/datasets/imagenet/train, seed=1) train_data="));
        assert_eq!(lines[1], "[0001] (no parameters) plain started pid=7");
    }

    #[test]
    fn json_report_flattens_outcomes() {
        let mut out = Vec::new();
        write_json(&mut out, &report()).expect("write");
        let value: Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["run_id"], "run");
        assert_eq!(value["results"][0]["outcome"], "submitted");
        assert_eq!(value["results"][0]["job_id"], "42");
        assert_eq!(value["results"][1]["reason"], "bad value");
        assert!(value.get("children").is_none());
    }
}
