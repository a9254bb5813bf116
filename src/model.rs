use crate::job::JobId;
use crate::param::ParamMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the external computation is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub program: PathBuf,
    /// Arguments placed before the translated parameter flags.
    #[serde(default)]
    pub base_args: Vec<String>,
    /// Arguments placed after the translated flags, right before the input.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Parent directory of job workspaces; the system temp dir when unset.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("FastTree"),
            base_args: Vec::new(),
            extra_args: Vec::new(),
            timeout: None,
            workspace_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum AppEvent {
    /// One diagnostic line written by the running computation.
    Log { job: JobId, line: String },
    Info(InfoEvent),
}

/// Structured info events emitted by the controller and consumed by front-ends.
#[derive(Debug, Clone, Serialize)]
pub enum InfoEvent {
    Message(String),
    Opened { input: PathBuf },
    Launched { job: JobId, command: String },
    Completed { job: JobId },
    Failed { reason: String },
    Cancelling { job: JobId },
    Cancelled { job: JobId },
    Saved { path: PathBuf },
}

impl InfoEvent {
    /// Render a human-readable message for front-ends.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Opened { input } => format!("Opened {}", input.display()),
            InfoEvent::Launched { job, command } => format!("Job {job} started: {command}"),
            InfoEvent::Completed { job } => format!("Job {job} finished"),
            InfoEvent::Failed { reason } => format!("Run failed: {reason}"),
            InfoEvent::Cancelling { job } => format!("Cancelling job {job}…"),
            InfoEvent::Cancelled { job } => format!("Job {job} cancelled"),
            InfoEvent::Saved { path } => format!("Saved tree to {}", path.display()),
        }
    }
}

/// Machine-readable result of a batch run (`--json`).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp_utc: String,
    pub input: PathBuf,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    pub params: ParamMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Complete,
    Failed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_reads_humantime_timeout() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{"program": "/opt/bin/FastTree", "timeout": "1h 30m", "extra_args": ["-gamma"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.timeout, Some(Duration::from_secs(90 * 60)));
        assert_eq!(cfg.extra_args, vec!["-gamma"]);
        assert!(cfg.workspace_root.is_none());
    }

    #[test]
    fn info_messages_name_the_job() {
        let msg = InfoEvent::Launched {
            job: JobId(3),
            command: "FastTree -nt a.fasta".into(),
        }
        .to_message();
        assert_eq!(msg, "Job #3 started: FastTree -nt a.fasta");
    }
}
