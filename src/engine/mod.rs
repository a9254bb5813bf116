//! Supervision of the external FastTree process.
//!
//! Every run is a separate OS process started inside the job's workspace. The
//! process writes the tree to stdout, which is redirected into the artifact file,
//! and its diagnostics to stderr, which is streamed into the job's [`LogSink`].

mod args;
mod newick;

pub use args::translate_config;
pub use newick::{validate_newick, NewickError};

use crate::job::{JobId, LaunchRequest, LogSink};
use crate::model::{AppEvent, InfoEvent, RunConfig};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc;

/// How long the log reader may keep running after the process has exited.
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Kill the process; the run reports [`Outcome::Cancelled`].
    Cancel,
}

#[derive(Debug, Error)]
pub enum ComputationFailure {
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create artifact file: {0}")]
    Artifact(#[source] std::io::Error),
    #[error("waiting for the computation failed: {0}")]
    Wait(#[source] std::io::Error),
    #[error("computation failed with {status}{}", last_line(.log_tail))]
    Exit {
        status: ExitStatus,
        log_tail: Vec<String>,
    },
    #[error("computation produced no tree: {0}")]
    MissingArtifact(#[source] std::io::Error),
    #[error("computation produced a malformed tree: {0}")]
    MalformedArtifact(#[from] NewickError),
    #[error("computation timed out after {}", human(.0))]
    TimedOut(Duration),
}

fn human(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

fn last_line(tail: &[String]) -> String {
    match tail.iter().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}

#[derive(Debug)]
pub enum Outcome {
    Completed { artifact: PathBuf },
    Failed(ComputationFailure),
    Cancelled,
}

/// Report sent back to the orchestrator when the engine task ends.
#[derive(Debug)]
pub struct JobReport {
    pub job: JobId,
    pub outcome: Outcome,
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct Engine {
    cfg: RunConfig,
}

impl Engine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Full argument vector for `req`, input path last.
    pub fn arguments(&self, req: &LaunchRequest) -> Vec<OsString> {
        self.cfg
            .base_args
            .iter()
            .cloned()
            .chain(translate_config(&req.config))
            .chain(self.cfg.extra_args.iter().cloned())
            .map(OsString::from)
            .chain(std::iter::once(req.input.clone().into_os_string()))
            .collect()
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.cfg.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn run(
        &self,
        req: LaunchRequest,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> JobReport {
        let outcome = self.execute(&req, event_tx, &mut control_rx).await;
        match &outcome {
            Outcome::Completed { .. } => tracing::info!(job = %req.job, "computation completed"),
            Outcome::Failed(e) => tracing::warn!(job = %req.job, error = %e, "computation failed"),
            Outcome::Cancelled => tracing::info!(job = %req.job, "computation cancelled"),
        }
        JobReport {
            job: req.job,
            outcome,
        }
    }

    async fn execute(
        &self,
        req: &LaunchRequest,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        control_rx: &mut mpsc::UnboundedReceiver<EngineControl>,
    ) -> Outcome {
        let stdout = match std::fs::File::create(&req.artifact) {
            Ok(f) => f,
            Err(e) => return Outcome::Failed(ComputationFailure::Artifact(e)),
        };

        let args = self.arguments(req);
        let command = self.command_line(&args);
        let mut child = match Command::new(&self.cfg.program)
            .args(&args)
            .current_dir(&req.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                return Outcome::Failed(ComputationFailure::Launch {
                    program: self.cfg.program.clone(),
                    source,
                })
            }
        };
        tracing::info!(job = %req.job, pid = ?child.id(), %command, "computation launched");
        let _ = event_tx.send(AppEvent::Info(InfoEvent::Launched {
            job: req.job,
            command,
        }));

        let sink = LogSink::open(req, event_tx).await;
        let log_task = tokio::spawn(pump_log(child.stderr.take(), sink));

        let limit = self.cfg.timeout;
        let deadline = async move {
            match limit {
                Some(d) => {
                    tokio::time::sleep(d).await;
                    d
                }
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut control_open = true;
        let stop = loop {
            tokio::select! {
                status = child.wait() => break Stop::Exited(status),
                msg = control_rx.recv(), if control_open => match msg {
                    Some(EngineControl::Cancel) => break Stop::Cancelled,
                    None => control_open = false,
                },
                d = &mut deadline => break Stop::TimedOut(d),
            }
        };

        match stop {
            Stop::Cancelled => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(job = %req.job, error = %e, "failed to kill computation");
                }
                log_task.abort();
                Outcome::Cancelled
            }
            Stop::TimedOut(d) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(job = %req.job, error = %e, "failed to kill computation");
                }
                drain(log_task).await;
                Outcome::Failed(ComputationFailure::TimedOut(d))
            }
            Stop::Exited(Err(e)) => {
                drain(log_task).await;
                Outcome::Failed(ComputationFailure::Wait(e))
            }
            Stop::Exited(Ok(status)) => {
                let log_tail = drain(log_task).await;
                if !status.success() {
                    return Outcome::Failed(ComputationFailure::Exit { status, log_tail });
                }
                // A zero exit status alone is not success.
                match tokio::fs::read_to_string(&req.artifact).await {
                    Err(e) => Outcome::Failed(ComputationFailure::MissingArtifact(e)),
                    Ok(text) => match validate_newick(&text) {
                        Ok(()) => Outcome::Completed {
                            artifact: req.artifact.clone(),
                        },
                        Err(e) => Outcome::Failed(e.into()),
                    },
                }
            }
        }
    }
}

async fn pump_log(stderr: Option<ChildStderr>, mut sink: LogSink) -> Vec<String> {
    if let Some(stderr) = stderr {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    sink.line(line.trim_end_matches(['\r', '\n']).to_string())
                        .await;
                }
            }
        }
    }
    sink.close().await
}

/// Wait for the log reader, giving up if a leftover process keeps stderr open.
async fn drain(log_task: tokio::task::JoinHandle<Vec<String>>) -> Vec<String> {
    let abort = log_task.abort_handle();
    match tokio::time::timeout(LOG_DRAIN_GRACE, log_task).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort.abort();
            Vec::new()
        }
    }
}

#[cfg(all(test, unix))]
#[path = "tests/engine.rs"]
mod tests;
