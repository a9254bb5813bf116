//! Run lifecycle state machine.
//!
//! `Idle` is a composite of two independent regions, the input (`None -> File`)
//! and the output (`None | Complete | Failed | Outdated`). `Running` replaces it
//! entirely and keeps the suspended `Idle` configuration as history, which is
//! restored when the run ends.

use crate::job::{Artifact, JobHandle, JobId, LaunchRequest, WorkspaceFactory};
use crate::param::ParamMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum Event {
    Open(PathBuf),
    /// Start a run with this configuration snapshot.
    Run(ParamMap),
    Done { job: JobId, artifact: PathBuf },
    Fail { job: JobId, reason: String },
    Cancel,
    ConfigChanged,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Open(_) => "open",
            Event::Run(_) => "run",
            Event::Done { .. } => "done",
            Event::Fail { .. } => "fail",
            Event::Cancel => "cancel",
            Event::ConfigChanged => "config_changed",
        }
    }
}

/// Work the caller must carry out after a transition.
#[derive(Debug)]
pub enum Effect {
    Nothing,
    /// Start the computation for the job that just entered `Running`.
    Launch(LaunchRequest),
    /// Stop the computation of a cancelled job. Its workspace is deleted when
    /// the handle is dropped, so drop it only after the process is gone.
    Terminate(JobHandle),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no input file is open")]
    NoInput,
    #[error("job {0} is still running")]
    Busy(JobId),
    #[error("no job is running")]
    NotRunning,
    #[error("result of job {job} ignored: it is no longer the active job")]
    StaleJob { job: JobId },
}

/// Render-facing snapshot of the machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Idle {
        input: Option<PathBuf>,
        output: OutputStatus,
    },
    Running {
        job: JobId,
        input: PathBuf,
    },
}

impl Status {
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running { .. })
    }

    pub fn input(&self) -> Option<&Path> {
        match self {
            Status::Idle { input, .. } => input.as_deref(),
            Status::Running { input, .. } => Some(input),
        }
    }

    pub fn output(&self) -> Option<&OutputStatus> {
        match self {
            Status::Idle { output, .. } => Some(output),
            Status::Running { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputStatus {
    None,
    Complete { artifact: PathBuf },
    Failed { reason: String },
    Outdated { artifact: PathBuf },
}

#[derive(Debug, Default)]
enum Input {
    #[default]
    None,
    File(PathBuf),
}

#[derive(Debug, Default)]
enum Output {
    #[default]
    None,
    Complete(Artifact),
    Failed(String),
    Outdated(Artifact),
}

#[derive(Debug, Default)]
struct Idle {
    input: Input,
    output: Output,
}

#[derive(Debug)]
enum State {
    Idle(Idle),
    Running { job: JobHandle, history: Idle },
}

impl Default for State {
    fn default() -> Self {
        State::Idle(Idle::default())
    }
}

#[derive(Debug)]
pub struct Machine {
    state: State,
    workspaces: WorkspaceFactory,
    next_job: u64,
}

impl Machine {
    pub fn new(workspaces: WorkspaceFactory) -> Self {
        Self {
            state: State::default(),
            workspaces,
            next_job: 1,
        }
    }

    pub fn status(&self) -> Status {
        match &self.state {
            State::Idle(idle) => Status::Idle {
                input: match &idle.input {
                    Input::None => None,
                    Input::File(p) => Some(p.clone()),
                },
                output: match &idle.output {
                    Output::None => OutputStatus::None,
                    Output::Complete(a) => OutputStatus::Complete {
                        artifact: a.path().to_path_buf(),
                    },
                    Output::Failed(reason) => OutputStatus::Failed {
                        reason: reason.clone(),
                    },
                    Output::Outdated(a) => OutputStatus::Outdated {
                        artifact: a.path().to_path_buf(),
                    },
                },
            },
            State::Running { job, .. } => Status::Running {
                job: job.id(),
                input: job.input_path().to_path_buf(),
            },
        }
    }

    /// The retained result, if the output is `Complete` or `Outdated`.
    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.state {
            State::Idle(Idle {
                output: Output::Complete(a) | Output::Outdated(a),
                ..
            }) => Some(a),
            _ => None,
        }
    }

    pub fn active_job(&self) -> Option<JobId> {
        match &self.state {
            State::Running { job, .. } => Some(job.id()),
            State::Idle(_) => None,
        }
    }

    /// Process one event. A rejected event leaves the state untouched.
    pub fn apply(&mut self, event: Event) -> Result<Effect, TransitionError> {
        let name = event.name();
        let result = self.transition(event);
        match &result {
            Ok(_) => tracing::debug!(event = name, status = ?self.status(), "transition"),
            Err(e) => tracing::debug!(event = name, error = %e, "event rejected"),
        }
        result
    }

    fn transition(&mut self, event: Event) -> Result<Effect, TransitionError> {
        match event {
            Event::Open(path) => {
                let idle = self.idle_mut()?;
                idle.input = Input::File(path);
                idle.output = Output::None;
                Ok(Effect::Nothing)
            }
            Event::Run(config) => {
                let mut idle = self.take_idle()?;
                let input = match &idle.input {
                    Input::File(p) => p.clone(),
                    Input::None => {
                        self.state = State::Idle(idle);
                        return Err(TransitionError::NoInput);
                    }
                };
                let id = JobId(self.next_job);
                self.next_job += 1;
                match JobHandle::prepare(id, &input, config, &self.workspaces) {
                    Ok(job) => {
                        let request = job.launch_request();
                        tracing::info!(job = %id, input = %request.input.display(), "run started");
                        self.state = State::Running { job, history: idle };
                        Ok(Effect::Launch(request))
                    }
                    Err(e) => {
                        tracing::warn!(job = %id, error = %e, "run setup failed");
                        idle.output = Output::Failed(e.to_string());
                        self.state = State::Idle(idle);
                        Ok(Effect::Nothing)
                    }
                }
            }
            Event::Done { job, artifact } => {
                let (handle, mut idle) = self.finish(job)?;
                idle.output = if artifact == handle.artifact_path() {
                    Output::Complete(handle.into_artifact())
                } else {
                    tracing::warn!(job = %job, artifact = %artifact.display(), "completion names a foreign artifact");
                    Output::Failed(format!(
                        "unexpected artifact {}, expected {}",
                        artifact.display(),
                        handle.artifact_path().display()
                    ))
                };
                self.state = State::Idle(idle);
                Ok(Effect::Nothing)
            }
            Event::Fail { job, reason } => {
                let (handle, mut idle) = self.finish(job)?;
                drop(handle);
                idle.output = Output::Failed(reason);
                self.state = State::Idle(idle);
                Ok(Effect::Nothing)
            }
            Event::Cancel => match std::mem::take(&mut self.state) {
                State::Running { job, history } => {
                    tracing::info!(job = %job.id(), "run cancelled");
                    self.state = State::Idle(history);
                    Ok(Effect::Terminate(job))
                }
                idle => {
                    self.state = idle;
                    Err(TransitionError::NotRunning)
                }
            },
            Event::ConfigChanged => {
                if let State::Idle(idle) = &mut self.state {
                    idle.output = match std::mem::take(&mut idle.output) {
                        Output::Complete(a) => Output::Outdated(a),
                        other => other,
                    };
                }
                Ok(Effect::Nothing)
            }
        }
    }

    fn idle_mut(&mut self) -> Result<&mut Idle, TransitionError> {
        match &mut self.state {
            State::Idle(idle) => Ok(idle),
            State::Running { job, .. } => Err(TransitionError::Busy(job.id())),
        }
    }

    fn take_idle(&mut self) -> Result<Idle, TransitionError> {
        match std::mem::take(&mut self.state) {
            State::Idle(idle) => Ok(idle),
            State::Running { job, history } => {
                let id = job.id();
                self.state = State::Running { job, history };
                Err(TransitionError::Busy(id))
            }
        }
    }

    /// Leave `Running` for the completion of `job`, returning its handle and
    /// the restored history.
    fn finish(&mut self, job: JobId) -> Result<(JobHandle, Idle), TransitionError> {
        match std::mem::take(&mut self.state) {
            State::Running { job: handle, history } if handle.id() == job => Ok((handle, history)),
            other => {
                self.state = other;
                Err(TransitionError::StaleJob { job })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/machine.rs"]
mod tests;
