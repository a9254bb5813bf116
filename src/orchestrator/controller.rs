//! Run lifecycle controller.
//!
//! Turns front-end commands into orchestrator events, owns the engine task of
//! the active job and reports back to presentation layers.

use super::{post_process, Effect, Event, Orchestrator, OutputStatus, TransitionError};
use crate::engine::{Engine, EngineControl, JobReport, Outcome};
use crate::job::{JobHandle, JobId, LaunchRequest};
use crate::model::{AppEvent, InfoEvent};
use crate::param::SharedTree;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// How long a cancelled process may take to die before the user is told.
const CANCEL_NOTICE_AFTER: Duration = Duration::from_secs(3);

/// Commands emitted by front-ends.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Open(PathBuf),
    Run,
    /// Cancel the active run. Front-ends ask the user before sending this.
    Cancel,
    /// Copy the retained tree to the given path, or next to the input.
    Save(Option<PathBuf>),
    Quit,
}

/// Internal handle for a running engine task.
struct RunCtx {
    job: JobId,
    ctrl_tx: UnboundedSender<EngineControl>,
    handle: Option<JoinHandle<JobReport>>,
}

fn start_run(
    engine: &Engine,
    req: LaunchRequest,
    event_tx: UnboundedSender<AppEvent>,
) -> RunCtx {
    let (ctrl_tx, ctrl_rx) = tokio::sync::mpsc::unbounded_channel::<EngineControl>();
    let job = req.job;
    let engine = engine.clone();
    let handle = tokio::spawn(async move { engine.run(req, event_tx, ctrl_rx).await });
    RunCtx {
        job,
        ctrl_tx,
        handle: Some(handle),
    }
}

/// Stop the engine task of a cancelled job. The workspace is removed once the
/// process is gone, so the returned task ends after cleanup.
fn terminate(
    job: JobHandle,
    ctx: Option<RunCtx>,
    event_tx: UnboundedSender<AppEvent>,
) -> JoinHandle<()> {
    let id = job.id();
    let _ = event_tx.send(AppEvent::Info(InfoEvent::Cancelling { job: id }));
    let handle = ctx.and_then(|ctx| {
        let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
        ctx.handle
    });
    tokio::spawn(async move {
        if let Some(mut handle) = handle {
            if tokio::time::timeout(CANCEL_NOTICE_AFTER, &mut handle)
                .await
                .is_err()
            {
                let _ = event_tx.send(AppEvent::Info(InfoEvent::Message(
                    "Still cancelling…".into(),
                )));
                let _ = handle.await;
            }
        }
        drop(job);
        let _ = event_tx.send(AppEvent::Info(InfoEvent::Cancelled { job: id }));
    })
}

fn report_to_event(
    report: std::result::Result<JobReport, tokio::task::JoinError>,
    job: JobId,
) -> Event {
    match report {
        Ok(JobReport {
            job,
            outcome: Outcome::Completed { artifact },
        }) => Event::Done { job, artifact },
        Ok(JobReport {
            job,
            outcome: Outcome::Failed(e),
        }) => Event::Fail {
            job,
            reason: e.to_string(),
        },
        // Only a cancel sent by `terminate` stops the engine, and that path
        // no longer watches the task.
        Ok(JobReport {
            job,
            outcome: Outcome::Cancelled,
        }) => Event::Fail {
            job,
            reason: "computation stopped unexpectedly".into(),
        },
        Err(e) => Event::Fail {
            job,
            reason: format!("engine task failed: {e}"),
        },
    }
}

fn failure_reason(orchestrator: &Orchestrator) -> Option<String> {
    match orchestrator.status().output() {
        Some(OutputStatus::Failed { reason }) => Some(reason.clone()),
        _ => None,
    }
}

/// Process front-end commands and engine completions until `Quit`.
pub async fn run_controller(
    orchestrator: Orchestrator,
    tree: SharedTree,
    engine: Engine,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;
    let info = |msg: InfoEvent| {
        let _ = event_tx.send(AppEvent::Info(msg));
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Open(path)) => {
                        match orchestrator.dispatch(Event::Open(path.clone())) {
                            Ok(_) => info(InfoEvent::Opened { input: path }),
                            Err(e) => info(InfoEvent::Message(format!("Cannot open: {e}"))),
                        }
                    }
                    Some(UiCommand::Run) => {
                        // Snapshot first; the tree lock must be released before dispatching.
                        let config = tree.lock().serialize();
                        match orchestrator.dispatch(Event::Run(config)) {
                            Ok(Effect::Launch(req)) => {
                                run_ctx = Some(start_run(&engine, req, event_tx.clone()));
                            }
                            Ok(_) => {
                                if let Some(reason) = failure_reason(&orchestrator) {
                                    info(InfoEvent::Failed { reason });
                                }
                            }
                            Err(e) => info(InfoEvent::Message(format!("Cannot run: {e}"))),
                        }
                    }
                    Some(UiCommand::Cancel) => {
                        match orchestrator.dispatch(Event::Cancel) {
                            Ok(Effect::Terminate(job)) => {
                                terminate(job, run_ctx.take(), event_tx.clone());
                            }
                            Ok(_) => {}
                            Err(e) => info(InfoEvent::Message(format!("Cannot cancel: {e}"))),
                        }
                    }
                    Some(UiCommand::Save(dest)) => {
                        match post_process::save_artifact(&orchestrator, dest.as_deref()) {
                            Ok(path) => info(InfoEvent::Saved { path }),
                            Err(e) => info(InfoEvent::Message(format!("Save failed: {e:#}"))),
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit cancels an active run and waits for its workspace to be removed.
                        if let Ok(Effect::Terminate(job)) = orchestrator.dispatch(Event::Cancel) {
                            let cleanup = terminate(job, run_ctx.take(), event_tx.clone());
                            let _ = cleanup.await;
                        }
                        break Ok(());
                    }
                }
            }
            // The JoinHandle stays in `run_ctx` until this branch wins, so a losing
            // branch never drops it.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some((ctx.job, h.await));
                    }
                }
                futures::future::pending().await
            } => {
                if let Some((job, join_res)) = maybe_done {
                    run_ctx = None;
                    match orchestrator.dispatch(report_to_event(join_res, job)) {
                        Ok(_) => match failure_reason(&orchestrator) {
                            Some(reason) => info(InfoEvent::Failed { reason }),
                            None => info(InfoEvent::Completed { job }),
                        },
                        Err(TransitionError::StaleJob { job }) => {
                            tracing::debug!(%job, "late completion ignored");
                        }
                        Err(e) => tracing::warn!(error = %e, "completion rejected"),
                    }
                }
            }
        }
    }
}
