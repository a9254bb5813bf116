use super::{ComputationFailure, Engine, EngineControl, Outcome};
use crate::job::{JobHandle, JobId, WorkspaceFactory};
use crate::model::{AppEvent, InfoEvent, RunConfig};
use crate::param::ParamMap;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Fixture {
    dir: TempDir,
    job: JobHandle,
    engine: Engine,
}

/// A job whose computation is the given shell script body.
fn fixture(script: &str, timeout: Option<Duration>) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("a.fasta");
    std::fs::write(&input, ">a\nACGT\n>b\nACGA\n").expect("write input");
    let script_path = dir.path().join("fasttree.sh");
    std::fs::write(&script_path, script).expect("write script");

    let job = JobHandle::prepare(
        JobId(1),
        &input,
        ParamMap::new(),
        &WorkspaceFactory::new(Some(dir.path().join("work"))),
    )
    .expect("prepare job");
    let engine = Engine::new(RunConfig {
        program: "/bin/sh".into(),
        base_args: vec![script_path.to_string_lossy().into_owned()],
        timeout,
        ..RunConfig::default()
    });
    Fixture { dir, job, engine }
}

async fn run(f: &Fixture) -> (Outcome, Vec<AppEvent>) {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let report = f
        .engine
        .run(f.job.launch_request(), event_tx, ctrl_rx)
        .await;
    assert_eq!(report.job, JobId(1));
    let mut events = Vec::new();
    while let Ok(ev) = event_rx.try_recv() {
        events.push(ev);
    }
    (report.outcome, events)
}

fn log_lines(events: &[AppEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|ev| match ev {
            AppEvent::Log { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn completes_with_valid_tree_and_streams_log() {
    let f = fixture(
        "echo 'reading alignment' >&2\necho '(a:0.1,b:0.2);'\n",
        None,
    );
    let (outcome, events) = run(&f).await;

    let Outcome::Completed { artifact } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(artifact, f.job.artifact_path());
    assert_eq!(
        std::fs::read_to_string(&artifact).unwrap().trim(),
        "(a:0.1,b:0.2);"
    );
    assert_eq!(log_lines(&events), vec!["reading alignment"]);
    assert!(std::fs::read_to_string(f.job.log_path())
        .unwrap()
        .contains("reading alignment"));
    assert!(matches!(
        events.first(),
        Some(AppEvent::Info(InfoEvent::Launched { .. }))
    ));
}

#[tokio::test]
async fn runs_inside_the_workspace_with_input_last() {
    let f = fixture("pwd >&2\nfor a in \"$@\"; do echo \"arg $a\" >&2; done\necho '(x);'\n", None);
    let (outcome, events) = run(&f).await;
    assert!(matches!(outcome, Outcome::Completed { .. }));

    let lines = log_lines(&events);
    let workspace = std::fs::canonicalize(f.job.workspace_path()).unwrap();
    assert_eq!(Path::new(lines[0]), workspace.as_path());
    let expected_input = format!("arg {}", f.job.input_path().display());
    assert_eq!(lines.last().copied(), Some(expected_input.as_str()));
}

#[tokio::test]
async fn nonzero_exit_fails_with_log_tail() {
    let f = fixture("echo 'Error: bad alignment' >&2\nexit 3\n", None);
    let (outcome, _) = run(&f).await;
    match outcome {
        Outcome::Failed(ComputationFailure::Exit { status, log_tail }) => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(log_tail, vec!["Error: bad alignment"]);
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_exit_without_tree_is_a_failure() {
    let f = fixture("echo 'Warning: something odd' >&2\nexit 0\n", None);
    let (outcome, _) = run(&f).await;
    assert!(matches!(
        outcome,
        Outcome::Failed(ComputationFailure::MalformedArtifact(_))
    ));

    let f = fixture("echo '(a,b'\n", None);
    let (outcome, _) = run(&f).await;
    assert!(matches!(
        outcome,
        Outcome::Failed(ComputationFailure::MalformedArtifact(_))
    ));
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() {
    let mut f = fixture("", None);
    f.engine = Engine::new(RunConfig {
        program: f.dir.path().join("no-such-fasttree"),
        ..RunConfig::default()
    });
    let (outcome, events) = run(&f).await;
    assert!(matches!(
        outcome,
        Outcome::Failed(ComputationFailure::Launch { .. })
    ));
    assert!(events.is_empty());
}

#[tokio::test]
async fn cancel_kills_the_process() {
    let f = fixture("exec sleep 30\n", None);
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    ctrl_tx.send(EngineControl::Cancel).unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        f.engine.run(f.job.launch_request(), event_tx, ctrl_rx),
    )
    .await
    .expect("cancel should not wait for the process");
    assert!(matches!(report.outcome, Outcome::Cancelled));
}

#[tokio::test]
async fn timeout_kills_and_fails() {
    let f = fixture("exec sleep 30\n", Some(Duration::from_millis(200)));
    let (outcome, _) = tokio::time::timeout(Duration::from_secs(10), run(&f))
        .await
        .expect("timeout should fire");
    assert!(matches!(
        outcome,
        Outcome::Failed(ComputationFailure::TimedOut(d)) if d == Duration::from_millis(200)
    ));
}
