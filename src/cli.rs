use crate::engine::Engine;
use crate::job::WorkspaceFactory;
use crate::model::{AppEvent, RunConfig, RunOutcome, RunSummary};
use crate::orchestrator::{self, Orchestrator, OutputStatus, Status, UiCommand};
use crate::param::{self, ParamPath, ParamTree, Value};
use crate::params::fasttree_params;
use crate::settings::{load_settings, Settings};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
pub(crate) enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
pub(crate) fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "fasttree-runner",
    version,
    about = "Approximately-maximum-likelihood phylogenetic trees with FastTree"
)]
pub struct Cli {
    /// Alignment file (FASTA or interleaved PHYLIP). Starts the shell when omitted
    pub input: Option<PathBuf>,

    /// FastTree executable (overrides the settings file and $FASTTREE_BIN)
    #[arg(long, value_name = "PATH")]
    pub fasttree: Option<PathBuf>,

    /// Set a parameter by path or name, e.g. `--set model.ncat=4` or `--set ncodes=20`
    #[arg(long = "set", value_name = "PARAM=VALUE")]
    pub set: Vec<String>,

    /// Load parameters from a JSON preset (nested by group or flat by name)
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Write the tree to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Kill the computation when it runs longer than this (e.g. `30m`)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Directory under which job workspaces are created
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Extra argument passed verbatim to FastTree (repeatable)
    #[arg(long = "extra-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub extra_args: Vec<String>,

    /// Settings file (default: <config dir>/fasttree-runner/settings.json)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print a JSON run summary (or the JSON parameter tree with --print-params)
    #[arg(long)]
    pub json: bool,

    /// Print the parameter tree and exit
    #[arg(long)]
    pub print_params: bool,

    /// Start the interactive shell even when an input is given
    #[arg(short, long)]
    pub interactive: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn run(args: Cli) -> Result<()> {
    let tree = build_tree(&args)?;

    if args.print_params {
        return print_params(&tree, args.json);
    }

    let settings = load_settings(args.settings.as_deref())?;
    let cfg = build_config(&args, settings);

    if args.interactive || args.input.is_none() {
        return crate::shell::run(cfg, tree, args.input.clone()).await;
    }

    run_batch(args, cfg, tree).await
}

/// Build a `RunConfig` from settings overridden by CLI arguments.
pub fn build_config(args: &Cli, settings: Settings) -> RunConfig {
    let defaults = RunConfig::default();
    let mut extra_args = settings.extra_args;
    extra_args.extend(args.extra_args.iter().cloned());
    RunConfig {
        program: args
            .fasttree
            .clone()
            .or(settings.program)
            .unwrap_or(defaults.program),
        base_args: defaults.base_args,
        extra_args,
        timeout: args.timeout.map(Duration::from).or(settings.timeout),
        workspace_root: args.workdir.clone().or(settings.workspace_root),
    }
}

/// The FastTree schema with the preset file and `--set` assignments applied.
pub fn build_tree(args: &Cli) -> Result<ParamTree> {
    let mut tree = fasttree_params().context("invalid parameter schema")?;

    if let Some(path) = args.params.as_deref() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read preset {}", path.display()))?;
        let preset: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid preset {}", path.display()))?;
        let report = tree.apply_map(&preset);
        if !report.rejected.is_empty() {
            let problems: Vec<String> = report
                .rejected
                .iter()
                .map(|(key, e)| format!("{key}: {e}"))
                .collect();
            bail!("preset {} rejected: {}", path.display(), problems.join("; "));
        }
        tracing::debug!(applied = report.applied, "preset applied");
    }

    for assignment in &args.set {
        let (name, value) = assignment
            .split_once('=')
            .with_context(|| format!("expected PARAM=VALUE, got {assignment:?}"))?;
        let path = resolve_path(&tree, name.trim())?;
        tree.set_value(&path, Value::from(value.trim()))
            .with_context(|| format!("--set {assignment}"))?;
    }
    Ok(tree)
}

/// Accept a dotted path (`model.ncat`) or a serialized field name (`ncat`).
pub(crate) fn resolve_path(tree: &ParamTree, text: &str) -> Result<ParamPath> {
    if !text.contains('.') {
        if let Some(path) = tree.find_by_name(text) {
            return Ok(path);
        }
    }
    let path: ParamPath = text.parse()?;
    tree.get(&path)?;
    Ok(path)
}

fn print_params(tree: &ParamTree, json: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&tree.serialize_nested())?)?;
    } else {
        for line in crate::text_summary::render_tree(tree).lines {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

/// Open, run, wait, then save or print the tree.
async fn run_batch(args: Cli, cfg: RunConfig, mut tree: ParamTree) -> Result<()> {
    let input = args.input.clone().context("no input file")?;
    let (out_tx, out_handle) = spawn_output_writer();

    let orchestrator = Orchestrator::new(WorkspaceFactory::new(cfg.workspace_root.clone()));
    orchestrator.attach(&mut tree)?;
    let tree = param::shared(tree);
    let params = tree.lock().serialize();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let mut status_rx = orchestrator.subscribe();
    let controller = tokio::spawn(orchestrator::run_controller(
        orchestrator.clone(),
        tree.clone(),
        Engine::new(cfg),
        event_tx,
        cmd_rx,
    ));

    let _ = cmd_tx.send(UiCommand::Open(input.clone()));
    let _ = cmd_tx.send(UiCommand::Run);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;
    let mut interrupt_armed = true;

    let status = loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(AppEvent::Log { line, .. }) => {
                    if !args.json {
                        let _ = out_tx.send(OutputLine::Stderr(line));
                    }
                }
                Some(AppEvent::Info(info)) => {
                    if !args.json {
                        let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                    }
                }
                None => break orchestrator.status(),
            },
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break orchestrator.status();
                }
                let status = status_rx.borrow_and_update().clone();
                if finished(&status, cancelled) {
                    break status;
                }
            }
            res = &mut ctrl_c, if interrupt_armed => {
                interrupt_armed = false;
                if res.is_ok() {
                    cancelled = true;
                    let _ = cmd_tx.send(UiCommand::Cancel);
                }
            }
        }
    };

    let (outcome, reason) = match status.output() {
        Some(OutputStatus::Complete { .. }) => (RunOutcome::Complete, None),
        Some(OutputStatus::Failed { reason }) => (RunOutcome::Failed, Some(reason.clone())),
        _ => (RunOutcome::Cancelled, None),
    };

    let mut tree_text = None;
    let mut written = None;
    if outcome == RunOutcome::Complete {
        match args.output.as_deref() {
            Some(dest) => {
                written = Some(orchestrator::save_artifact(&orchestrator, Some(dest))?);
            }
            None => tree_text = Some(orchestrator::read_tree(&orchestrator)?),
        }
    }

    // Quit also waits for a cancelled job's workspace to be removed.
    let _ = cmd_tx.send(UiCommand::Quit);
    controller.await.context("controller task failed")??;

    if args.json {
        let summary = RunSummary {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            input,
            outcome,
            reason: reason.clone(),
            output: written.clone(),
            tree: tree_text.clone(),
            params,
        };
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&summary)?));
    } else if let Some(text) = tree_text {
        let _ = out_tx.send(OutputLine::Stdout(text.trim_end().to_string()));
    } else if let Some(path) = written {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", path.display())));
    }
    drop(out_tx);
    let _ = out_handle.await;

    match outcome {
        RunOutcome::Complete => Ok(()),
        RunOutcome::Failed => bail!("{}", reason.unwrap_or_else(|| "run failed".into())),
        RunOutcome::Cancelled => bail!("run cancelled"),
    }
}

/// A batch run is over once it has a result, or after a cancel once it is idle.
fn finished(status: &Status, cancelled: bool) -> bool {
    match status.output() {
        Some(OutputStatus::Complete { .. } | OutputStatus::Failed { .. }) => true,
        Some(_) => cancelled,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(argv: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("fasttree-runner").chain(argv.iter().copied()))
    }

    #[test]
    fn set_accepts_paths_and_names() {
        let args = parse(&["a.fasta", "--set", "model.ncat=4", "--set", "ncodes=20"]);
        let tree = build_tree(&args).unwrap();
        let snapshot = tree.serialize();
        assert_eq!(snapshot["ncat"], Value::Int(4));
        assert_eq!(snapshot["ncodes"], Value::Int(20));
    }

    #[test]
    fn invalid_set_is_reported() {
        let args = parse(&["a.fasta", "--set", "ncodes=5"]);
        let err = build_tree(&args).unwrap_err();
        assert!(format!("{err:#}").contains("ncodes=5"));

        let args = parse(&["a.fasta", "--set", "bootstrap=100"]);
        assert!(build_tree(&args).is_err());

        let args = parse(&["a.fasta", "--set", "ncat"]);
        assert!(build_tree(&args).is_err());
    }

    #[test]
    fn preset_file_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let preset = dir.path().join("preset.json");
        std::fs::write(&preset, r#"{"model": {"ml_model": "wag"}, "spr": 4}"#).unwrap();
        let args = parse(&["--params", preset.to_str().unwrap()]);
        let snapshot = build_tree(&args).unwrap().serialize();
        assert_eq!(snapshot["ml_model"], Value::from("wag"));
        assert_eq!(snapshot["spr"], Value::Int(4));
    }

    #[test]
    fn cli_overrides_settings() {
        let settings = Settings {
            program: Some("/opt/FastTree".into()),
            extra_args: vec!["-gamma".into()],
            timeout: Some(Duration::from_secs(60)),
            workspace_root: None,
        };
        let args = parse(&[
            "a.fasta",
            "--fasttree",
            "/usr/local/bin/FastTreeMP",
            "--timeout",
            "5m",
            "--extra-arg",
            "-boot",
            "--extra-arg",
            "100",
        ]);
        let cfg = build_config(&args, settings);
        assert_eq!(cfg.program, Path::new("/usr/local/bin/FastTreeMP"));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(300)));
        assert_eq!(cfg.extra_args, vec!["-gamma", "-boot", "100"]);

        let cfg = build_config(&parse(&["a.fasta"]), Settings::default());
        assert_eq!(cfg.program, Path::new("FastTree"));
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn batch_waits_for_result_or_cancel() {
        let idle = |output| Status::Idle {
            input: Some("a.fasta".into()),
            output,
        };
        assert!(!finished(&idle(OutputStatus::None), false));
        assert!(finished(&idle(OutputStatus::None), true));
        assert!(finished(
            &idle(OutputStatus::Failed {
                reason: "x".into()
            }),
            false
        ));
        let running = Status::Running {
            job: crate::job::JobId(1),
            input: "a.fasta".into(),
        };
        assert!(!finished(&running, true));
    }
}
