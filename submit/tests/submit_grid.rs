//! End-to-end grid expansion, rendering and dispatch against a recording
//! launcher and the real template engine.

use std::collections::HashSet;
use std::fs;

use submit::core::types::DispatchOutcome;
use submit::io::template::JinjaEngine;
use submit::submit::submit_job;
use submit::test_support::{LaunchCall, RecordingLauncher, TestWorkspace};

fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn defaults_and_overrides_expand_in_order() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("seed", &["1", "2"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");

    let tuples: Vec<Vec<(String, String)>> =
        report.results.iter().map(|r| r.args.clone()).collect();
    assert_eq!(
        tuples,
        vec![
            labels(&[("lr", "0.1"), ("seed", "1")]),
            labels(&[("lr", "0.1"), ("seed", "2")]),
            labels(&[("lr", "0.01"), ("seed", "1")]),
            labels(&[("lr", "0.01"), ("seed", "2")]),
        ]
    );
    assert!(
        report
            .results
            .iter()
            .all(|r| matches!(r.outcome, DispatchOutcome::Started { .. }))
    );

    let logs: HashSet<_> = report.results.iter().map(|r| r.log_path.clone()).collect();
    let scripts: HashSet<_> = report.results.iter().map(|r| r.script_file.clone()).collect();
    assert_eq!(logs.len(), 4);
    assert_eq!(scripts.len(), 4);
    assert!(report.all_ok());
}

#[test]
fn dispatch_order_matches_grid_order() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("seed", &["1", "2", "3"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");

    let called: Vec<_> = launcher
        .calls()
        .iter()
        .map(|call| call.script_file().to_path_buf())
        .collect();
    let expected: Vec<_> = report
        .results
        .iter()
        .map(|r| r.script_file.clone().expect("script file"))
        .collect();
    assert_eq!(called, expected);
    for (index, result) in report.results.iter().enumerate() {
        assert_eq!(result.index, index);
    }
}

#[test]
fn rendered_scripts_and_log_headers_are_written() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("lr", &["0.5"]), ("name", &["my run"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");
    let result = &report.results[0];

    let body = fs::read_to_string(result.script_file.as_ref().expect("script")).expect("read");
    assert_eq!(body, "#!/bin/bash\npython3 train.py --lr 0.5 --name 'my run'\n");
    let log = fs::read_to_string(result.log_path.as_ref().expect("log")).expect("read");
    assert!(log.starts_with(&format!("Job Name: {}\n", result.job_name)));

    let Some(LaunchCall::Spawn { env, .. }) = launcher.calls().into_iter().next() else {
        panic!("expected a spawn");
    };
    assert!(env.contains(&("SUBMIT_RUN_ID".to_string(), "test_run".to_string())));
}

#[test]
fn rejected_value_fails_only_its_instance() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("lr", &["0.1", "fast", "0.001"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failed_count(), 1);
    match &report.results[1].outcome {
        DispatchOutcome::Failed { reason } => {
            assert!(reason.contains("lr"), "{reason}");
            assert!(reason.contains("fast"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(launcher.calls().len(), 2);
}

#[test]
fn launcher_failure_fails_only_its_instance() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("seed", &["7"]), ("lr", &["1", "2", "3"])]);
    let launcher = RecordingLauncher::failing_on(&["0001-"]);

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");

    let failed: Vec<bool> = report.results.iter().map(|r| r.outcome.is_failed()).collect();
    assert_eq!(failed, vec![false, true, false]);
    assert_eq!(launcher.calls().len(), 3);
    assert!(!report.all_ok());
}

#[test]
fn override_replaces_default_sequence() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("lr", &["9"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].args, labels(&[("lr", "9")]));
}

#[test]
fn script_without_arguments_runs_once() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "plain", &[]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].job_name, "plain");
    assert!(report.results[0].args.is_empty());
}

#[test]
fn slurm_mode_submits_with_scheduler_flags() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let mut request = ws.request("slurm", "train", &[]);
    request.scheduler.partition = Some("gpu".to_string());
    request.scheduler.gres = Some("gpu:1".to_string());
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");

    let ids: Vec<DispatchOutcome> = report.results.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(
        ids,
        vec![
            DispatchOutcome::Submitted {
                job_id: "1001".to_string()
            },
            DispatchOutcome::Submitted {
                job_id: "1002".to_string()
            },
        ]
    );

    for call in launcher.calls() {
        let LaunchCall::Submit { command, args, .. } = call else {
            panic!("expected a submission");
        };
        assert_eq!(command, "sbatch");
        assert!(args.contains(&"--parsable".to_string()));
        assert!(args.contains(&"--partition=gpu".to_string()));
        assert!(args.contains(&"--gres=gpu:1".to_string()));
    }

    let body = fs::read_to_string(report.results[0].script_file.as_ref().expect("script"))
        .expect("read");
    assert!(body.contains("#SBATCH --partition=gpu\n"), "{body}");
    let log_dir = ws.path("logs/slurm/test_run");
    assert!(log_dir.is_dir());
}

#[test]
fn unknown_mode_writes_nothing() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("cluster", "train", &[]);
    let launcher = RecordingLauncher::default();

    let err = submit_job(&config, &request, &JinjaEngine::new(), &launcher).unwrap_err();
    assert!(err.is_fatal());
    assert!(launcher.calls().is_empty());
    assert!(!ws.path(".submit").exists());
}

#[test]
fn numeric_overrides_reach_the_script_as_typed() {
    let ws = TestWorkspace::with_defaults().expect("workspace");
    let config = ws.config().expect("config");
    let request = ws.request("local", "train", &[("lr", &["1.10", "1e-3"]), ("run", &["007"])]);
    let launcher = RecordingLauncher::default();

    let report = submit_job(&config, &request, &JinjaEngine::new(), &launcher).expect("submit");
    assert!(report.all_ok());
    assert_eq!(report.results[0].args, labels(&[("lr", "1.10"), ("run", "007")]));

    let body = fs::read_to_string(report.results[1].script_file.as_ref().expect("script"))
        .expect("read");
    assert_eq!(body, "#!/bin/bash\npython3 train.py --lr 1e-3 --run 007\n");
}
