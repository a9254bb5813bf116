//! Bookkeeping for one execution attempt.
//!
//! A [`JobHandle`] exclusively owns a fresh temporary workspace. On success it
//! becomes an [`Artifact`] that keeps the workspace alive until the caller is
//! done with the result; on failure or cancellation it is dropped and the
//! workspace is deleted with it.

use crate::model::AppEvent;
use crate::param::ParamMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;

/// File name of the tree written by the computation inside its workspace.
pub const ARTIFACT_FILE: &str = "tree";
/// File name of the captured diagnostic log inside the workspace.
pub const LOG_FILE: &str = "fasttree.log";
const WORKSPACE_PREFIX: &str = "fasttree_";
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raised before any process is started.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot read input {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input {} is not a regular file", path.display())]
    NotAFile { path: PathBuf },
    #[error("cannot create workspace: {0}")]
    Workspace(#[source] std::io::Error),
}

/// Where job workspaces are created.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceFactory {
    root: Option<PathBuf>,
}

impl WorkspaceFactory {
    /// Workspaces under `root`, or the system temp dir when `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn create(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    input: PathBuf,
    workspace: TempDir,
    config: ParamMap,
}

impl JobHandle {
    /// Check the input and create the workspace. `config` is the snapshot the
    /// run will use regardless of later edits to the tree.
    pub fn prepare(
        id: JobId,
        input: &Path,
        config: ParamMap,
        workspaces: &WorkspaceFactory,
    ) -> Result<Self, SetupError> {
        let unreadable = |source| SetupError::InputUnreadable {
            path: input.to_path_buf(),
            source,
        };
        // The process runs inside the workspace, so relative inputs must be resolved first.
        let resolved = std::fs::canonicalize(input).map_err(unreadable)?;
        if !std::fs::metadata(&resolved).map_err(unreadable)?.is_file() {
            return Err(SetupError::NotAFile {
                path: input.to_path_buf(),
            });
        }
        std::fs::File::open(&resolved).map_err(unreadable)?;
        let workspace = workspaces.create().map_err(SetupError::Workspace)?;
        tracing::debug!(job = %id, workspace = %workspace.path().display(), "workspace created");
        Ok(Self {
            id,
            input: resolved,
            workspace,
            config,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.workspace.path().join(ARTIFACT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.workspace.path().join(LOG_FILE)
    }

    pub fn config(&self) -> &ParamMap {
        &self.config
    }

    /// Plain data handed to the engine task.
    pub fn launch_request(&self) -> LaunchRequest {
        LaunchRequest {
            job: self.id,
            input: self.input.clone(),
            workspace: self.workspace_path().to_path_buf(),
            artifact: self.artifact_path(),
            log: self.log_path(),
            config: self.config.clone(),
        }
    }

    /// Keep the workspace as the result of a successful run.
    pub fn into_artifact(self) -> Artifact {
        let path = self.artifact_path();
        Artifact {
            job: self.id,
            input: self.input,
            path,
            config: self.config,
            _workspace: self.workspace,
        }
    }
}

/// Everything the engine needs to start the computation.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub job: JobId,
    pub input: PathBuf,
    pub workspace: PathBuf,
    pub artifact: PathBuf,
    pub log: PathBuf,
    pub config: ParamMap,
}

/// Result of a successful run. Dropping it deletes the workspace.
#[derive(Debug)]
pub struct Artifact {
    job: JobId,
    input: PathBuf,
    path: PathBuf,
    config: ParamMap,
    _workspace: TempDir,
}

impl Artifact {
    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration the artifact was produced with.
    pub fn config(&self) -> &ParamMap {
        &self.config
    }
}

/// Diagnostic sink of a running job: the workspace log file, live events for
/// presentation layers, and a short tail for failure reports.
pub struct LogSink {
    job: JobId,
    file: Option<tokio::fs::File>,
    events: UnboundedSender<AppEvent>,
    tail: VecDeque<String>,
}

impl LogSink {
    pub async fn open(req: &LaunchRequest, events: UnboundedSender<AppEvent>) -> Self {
        let file = match tokio::fs::File::create(&req.log).await {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(job = %req.job, error = %e, "log file unavailable, keeping log in memory only");
                None
            }
        };
        Self {
            job: req.job,
            file,
            events,
            tail: VecDeque::with_capacity(LOG_TAIL_LINES),
        }
    }

    pub async fn line(&mut self, line: String) {
        if let Some(file) = self.file.as_mut() {
            let write = async {
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await
            };
            if let Err(e) = write.await {
                tracing::warn!(job = %self.job, error = %e, "log write failed");
                self.file = None;
            }
        }
        if self.tail.len() == LOG_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        let _ = self.events.send(AppEvent::Log { job: self.job, line });
    }

    pub fn tail(&self) -> Vec<String> {
        self.tail.iter().cloned().collect()
    }

    pub async fn close(mut self) -> Vec<String> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush().await;
        }
        self.tail.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::Value;

    fn config() -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("ncodes".into(), Value::Int(4));
        map
    }

    #[test]
    fn prepare_creates_exclusive_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.fasta");
        std::fs::write(&input, ">a\nACGT\n").unwrap();
        let factory = WorkspaceFactory::new(Some(dir.path().join("work")));

        let one = JobHandle::prepare(JobId(1), &input, config(), &factory).unwrap();
        let two = JobHandle::prepare(JobId(2), &input, config(), &factory).unwrap();
        assert_ne!(one.workspace_path(), two.workspace_path());
        assert!(one.workspace_path().is_dir());
        assert_eq!(one.artifact_path(), one.workspace_path().join("tree"));

        let workspace = one.workspace_path().to_path_buf();
        drop(one);
        assert!(!workspace.exists());
    }

    #[test]
    fn artifact_keeps_workspace_alive() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.fasta");
        std::fs::write(&input, ">a\nACGT\n").unwrap();
        let job = JobHandle::prepare(JobId(7), &input, config(), &WorkspaceFactory::default())
            .unwrap();
        std::fs::write(job.artifact_path(), "(a,b);").unwrap();

        let artifact = job.into_artifact();
        assert!(artifact.path().exists());
        assert_eq!(artifact.job(), JobId(7));
        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn missing_or_directory_input_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = WorkspaceFactory::default();
        let missing = JobHandle::prepare(JobId(1), &dir.path().join("nope"), config(), &factory);
        assert!(matches!(missing, Err(SetupError::InputUnreadable { .. })));
        let not_file = JobHandle::prepare(JobId(1), dir.path(), config(), &factory);
        assert!(matches!(not_file, Err(SetupError::NotAFile { .. })));
    }

    #[tokio::test]
    async fn log_sink_keeps_a_bounded_tail() {
        let dir = tempfile::tempdir().unwrap();
        let req = LaunchRequest {
            job: JobId(3),
            input: dir.path().join("in"),
            workspace: dir.path().to_path_buf(),
            artifact: dir.path().join(ARTIFACT_FILE),
            log: dir.path().join(LOG_FILE),
            config: config(),
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = LogSink::open(&req, tx).await;
        for i in 0..25 {
            sink.line(format!("line {i}")).await;
        }
        let tail = sink.close().await;
        assert_eq!(tail.len(), LOG_TAIL_LINES);
        assert_eq!(tail.first().map(String::as_str), Some("line 5"));

        let written = std::fs::read_to_string(&req.log).unwrap();
        assert_eq!(written.lines().count(), 25);
        assert!(matches!(rx.try_recv(), Ok(AppEvent::Log { job: JobId(3), .. })));
    }
}
