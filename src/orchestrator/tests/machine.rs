use super::{Effect, Event, Machine, OutputStatus, Status, TransitionError};
use crate::job::{JobId, LaunchRequest, WorkspaceFactory};
use crate::param::{ParamMap, Value};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Bench {
    dir: TempDir,
    input: PathBuf,
    machine: Machine,
}

fn bench() -> Bench {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("a.fasta");
    std::fs::write(&input, ">a\nACGT\n").expect("write input");
    let machine = Machine::new(WorkspaceFactory::new(Some(dir.path().join("work"))));
    Bench {
        dir,
        input,
        machine,
    }
}

fn config() -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("ncat".into(), Value::Int(20));
    map
}

fn launch(machine: &mut Machine) -> LaunchRequest {
    match machine.apply(Event::Run(config())) {
        Ok(Effect::Launch(req)) => req,
        other => panic!("expected launch, got {other:?}"),
    }
}

/// Simulate a computation that wrote a tree and report it.
fn complete(machine: &mut Machine, req: &LaunchRequest) {
    std::fs::write(&req.artifact, "(a,b);\n").expect("write artifact");
    let effect = machine
        .apply(Event::Done {
            job: req.job,
            artifact: req.artifact.clone(),
        })
        .expect("done accepted");
    assert!(matches!(effect, Effect::Nothing));
}

fn idle(input: Option<&Path>, output: OutputStatus) -> Status {
    Status::Idle {
        input: input.map(Path::to_path_buf),
        output,
    }
}

#[test]
fn starts_idle_and_requires_input_to_run() {
    let mut b = bench();
    assert_eq!(b.machine.status(), idle(None, OutputStatus::None));
    assert_eq!(
        b.machine.apply(Event::Run(config())).unwrap_err(),
        TransitionError::NoInput
    );
    assert_eq!(b.machine.status(), idle(None, OutputStatus::None));
}

#[test]
fn open_run_done_lands_complete() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    assert_eq!(
        b.machine.status(),
        idle(Some(&b.input), OutputStatus::None)
    );

    let req = launch(&mut b.machine);
    assert_eq!(req.job, JobId(1));
    assert_eq!(req.config, config());
    assert!(req.workspace.starts_with(b.dir.path().join("work")));
    assert!(b.machine.status().is_running());

    complete(&mut b.machine, &req);
    assert_eq!(
        b.machine.status(),
        idle(
            Some(&b.input),
            OutputStatus::Complete {
                artifact: req.artifact.clone()
            }
        )
    );
    let artifact = b.machine.artifact().expect("artifact retained");
    assert_eq!(artifact.config(), &config());
    assert!(req.artifact.exists());
}

#[test]
fn only_one_run_in_flight() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let req = launch(&mut b.machine);

    assert_eq!(
        b.machine.apply(Event::Run(config())).unwrap_err(),
        TransitionError::Busy(req.job)
    );
    assert_eq!(
        b.machine.apply(Event::Open(b.input.clone())).unwrap_err(),
        TransitionError::Busy(req.job)
    );
    assert_eq!(b.machine.active_job(), Some(req.job));
}

#[test]
fn failure_discards_workspace_and_allows_retry() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let req = launch(&mut b.machine);
    assert!(req.workspace.is_dir());

    b.machine
        .apply(Event::Fail {
            job: req.job,
            reason: "exit status: 1".into(),
        })
        .unwrap();
    assert_eq!(
        b.machine.status(),
        idle(
            Some(&b.input),
            OutputStatus::Failed {
                reason: "exit status: 1".into()
            }
        )
    );
    assert!(!req.workspace.exists());

    let retry = launch(&mut b.machine);
    assert_eq!(retry.job, JobId(2));
    assert_ne!(retry.workspace, req.workspace);
}

#[test]
fn config_change_marks_complete_outdated_only() {
    let mut b = bench();
    b.machine.apply(Event::ConfigChanged).unwrap();
    assert_eq!(b.machine.status(), idle(None, OutputStatus::None));

    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let first = launch(&mut b.machine);
    // Dropped while running: the snapshot is already taken.
    b.machine.apply(Event::ConfigChanged).unwrap();
    assert!(b.machine.status().is_running());
    complete(&mut b.machine, &first);

    b.machine.apply(Event::ConfigChanged).unwrap();
    assert_eq!(
        b.machine.status(),
        idle(
            Some(&b.input),
            OutputStatus::Outdated {
                artifact: first.artifact.clone()
            }
        )
    );
    assert!(b.machine.artifact().is_some());

    let second = launch(&mut b.machine);
    complete(&mut b.machine, &second);
    assert_eq!(
        b.machine.status().output(),
        Some(&OutputStatus::Complete {
            artifact: second.artifact.clone()
        })
    );
    assert!(!first.workspace.exists());
}

#[test]
fn open_resets_output_and_releases_artifact() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let req = launch(&mut b.machine);
    complete(&mut b.machine, &req);

    let other = b.dir.path().join("b.fasta");
    b.machine.apply(Event::Open(other.clone())).unwrap();
    assert_eq!(b.machine.status(), idle(Some(&other), OutputStatus::None));
    assert!(!req.workspace.exists());
}

#[test]
fn cancel_rolls_back_and_ignores_late_results() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let first = launch(&mut b.machine);
    complete(&mut b.machine, &first);
    b.machine.apply(Event::ConfigChanged).unwrap();
    let before = b.machine.status();

    let second = launch(&mut b.machine);
    let Ok(Effect::Terminate(job)) = b.machine.apply(Event::Cancel) else {
        panic!("cancel must hand back the job");
    };
    assert_eq!(job.id(), second.job);
    assert_eq!(b.machine.status(), before);
    drop(job);
    assert!(!second.workspace.exists());

    assert_eq!(
        b.machine
            .apply(Event::Done {
                job: second.job,
                artifact: second.artifact.clone(),
            })
            .unwrap_err(),
        TransitionError::StaleJob { job: second.job }
    );
    assert_eq!(
        b.machine
            .apply(Event::Fail {
                job: second.job,
                reason: "killed".into(),
            })
            .unwrap_err(),
        TransitionError::StaleJob { job: second.job }
    );
    assert_eq!(b.machine.status(), before);
    assert_eq!(
        b.machine.apply(Event::Cancel).unwrap_err(),
        TransitionError::NotRunning
    );
}

#[test]
fn stale_completion_does_not_end_the_current_run() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let first = launch(&mut b.machine);
    let Ok(Effect::Terminate(_job)) = b.machine.apply(Event::Cancel) else {
        panic!("cancel must hand back the job");
    };
    let second = launch(&mut b.machine);

    let err = b
        .machine
        .apply(Event::Done {
            job: first.job,
            artifact: first.artifact.clone(),
        })
        .unwrap_err();
    assert_eq!(err, TransitionError::StaleJob { job: first.job });
    assert_eq!(b.machine.active_job(), Some(second.job));
}

#[test]
fn setup_error_fails_without_launching() {
    let mut b = bench();
    let missing = b.dir.path().join("missing.fasta");
    b.machine.apply(Event::Open(missing.clone())).unwrap();

    let effect = b.machine.apply(Event::Run(config())).unwrap();
    assert!(matches!(effect, Effect::Nothing));
    match b.machine.status() {
        Status::Idle {
            input,
            output: OutputStatus::Failed { reason },
        } => {
            assert_eq!(input, Some(missing));
            assert!(reason.starts_with("cannot read input"), "{reason}");
        }
        other => panic!("expected failed output, got {other:?}"),
    }
}

#[test]
fn done_with_foreign_artifact_is_a_failure() {
    let mut b = bench();
    b.machine.apply(Event::Open(b.input.clone())).unwrap();
    let req = launch(&mut b.machine);
    b.machine
        .apply(Event::Done {
            job: req.job,
            artifact: b.dir.path().join("elsewhere.tre"),
        })
        .unwrap();
    assert!(matches!(
        b.machine.status().output(),
        Some(OutputStatus::Failed { .. })
    ));
    assert!(b.machine.artifact().is_none());
    assert!(!req.workspace.exists());
}
