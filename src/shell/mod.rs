//! Line-oriented interactive front-end.
//!
//! The prompt loop runs on a dedicated thread so blocking stdin reads stay out
//! of the Tokio runtime. It edits the shared tree directly and drives runs
//! through [`UiCommand`]s; a printer task reports log lines and status changes.

mod help;

use crate::cli::{resolve_path, spawn_output_writer, OutputLine};
use crate::engine::Engine;
use crate::job::WorkspaceFactory;
use crate::model::{AppEvent, RunConfig};
use crate::orchestrator::{self, Orchestrator, Status, UiCommand};
use crate::param::{self, ParamPath, ParamTree, SharedTree, Value};
use crate::text_summary::{render_node, render_status};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

/// How long queued output may take to print after quitting.
const PRINTER_FLUSH: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Empty,
    Help,
    Show(Option<String>),
    Set(String, String),
    Reset(Option<String>),
    Open(PathBuf),
    Run,
    Cancel,
    Save(Option<PathBuf>),
    Status,
    Params,
    Quit,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());
    let cmd = match word {
        "" => ShellCommand::Empty,
        "help" | "?" => ShellCommand::Help,
        "show" | "ls" => ShellCommand::Show(arg),
        "set" => {
            let (path, value) = rest
                .split_once(char::is_whitespace)
                .ok_or("usage: set PARAM VALUE")?;
            ShellCommand::Set(path.to_string(), value.trim().to_string())
        }
        "reset" => ShellCommand::Reset(arg),
        "open" => ShellCommand::Open(arg.ok_or("usage: open FILE")?.into()),
        "run" => ShellCommand::Run,
        "cancel" => ShellCommand::Cancel,
        "save" => ShellCommand::Save(arg.map(PathBuf::from)),
        "status" => ShellCommand::Status,
        "params" => ShellCommand::Params,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(cmd)
}

pub async fn run(cfg: RunConfig, mut tree: ParamTree, input: Option<PathBuf>) -> Result<()> {
    // Unbounded channels keep the prompt thread from ever blocking on the runtime.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (out_tx, out_handle) = spawn_output_writer();

    let orchestrator = Orchestrator::new(WorkspaceFactory::new(cfg.workspace_root.clone()));
    orchestrator.attach(&mut tree)?;
    let tree = param::shared(tree);

    if let Some(input) = input {
        let _ = cmd_tx.send(UiCommand::Open(input));
    }

    let printer = tokio::spawn(print_events(
        event_rx,
        orchestrator.subscribe(),
        out_tx.clone(),
    ));

    let ui_tree = tree.clone();
    let ui_orchestrator = orchestrator.clone();
    let ui_out = out_tx.clone();
    let ui_handle = std::thread::spawn(move || {
        let stdin = std::io::stdin();
        run_threaded(stdin.lock(), ui_tree, ui_orchestrator, cmd_tx, ui_out)
    });

    let res = orchestrator::run_controller(
        orchestrator,
        tree,
        Engine::new(cfg),
        event_tx,
        cmd_rx,
    )
    .await;

    let printer_abort = printer.abort_handle();
    if tokio::time::timeout(PRINTER_FLUSH, printer).await.is_err() {
        tracing::debug!("printer still busy at exit");
        printer_abort.abort();
    }
    drop(out_tx);
    let _ = out_handle.await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("shell thread panicked")),
        }
    }

    res
}

/// Print engine events and status transitions until the controller is gone.
async fn print_events(
    mut event_rx: UnboundedReceiver<AppEvent>,
    mut status_rx: watch::Receiver<Status>,
    out_tx: UnboundedSender<OutputLine>,
) {
    let mut watching = true;
    loop {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(AppEvent::Log { job, line }) => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("[{job}] {line}")));
                }
                Some(AppEvent::Info(info)) => {
                    let _ = out_tx.send(OutputLine::Stdout(info.to_message()));
                }
                None => break,
            },
            changed = status_rx.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let line = render_status(&status_rx.borrow_and_update());
                let _ = out_tx.send(OutputLine::Stdout(format!("status: {line}")));
            }
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Run the prompt loop on a dedicated thread.
fn run_threaded<R: BufRead>(
    input: R,
    tree: SharedTree,
    orchestrator: Orchestrator,
    cmd_tx: UnboundedSender<UiCommand>,
    out_tx: UnboundedSender<OutputLine>,
) -> Result<()> {
    let out = |line: String| {
        let _ = out_tx.send(OutputLine::Stdout(line));
    };
    out("Type `help` for commands.".into());

    let mut lines = input.lines();
    loop {
        let Some(line) = lines.next() else {
            let _ = cmd_tx.send(UiCommand::Quit);
            return Ok(());
        };
        let line = line.context("failed to read command")?;
        let cmd = match parse_command(&line) {
            Ok(cmd) => cmd,
            Err(msg) => {
                out(msg);
                continue;
            }
        };
        let flow = execute(cmd, &tree, &orchestrator, &cmd_tx, &out, &mut || {
            lines.next().and_then(|l| l.ok())
        });
        if let Flow::Quit = flow {
            return Ok(());
        }
    }
}

fn execute(
    cmd: ShellCommand,
    tree: &SharedTree,
    orchestrator: &Orchestrator,
    cmd_tx: &UnboundedSender<UiCommand>,
    out: &dyn Fn(String),
    next_line: &mut dyn FnMut() -> Option<String>,
) -> Flow {
    let running = orchestrator.status().is_running();
    match cmd {
        ShellCommand::Empty => {}
        ShellCommand::Help => help::help_lines().into_iter().for_each(out),
        ShellCommand::Show(path) => {
            let tree = tree.lock();
            match lookup(&tree, path.as_deref())
                .and_then(|p| render_node(&tree, &p).map_err(Into::into))
            {
                Ok(summary) => summary.lines.into_iter().for_each(out),
                Err(e) => out(format!("{e:#}")),
            }
        }
        ShellCommand::Set(path, value) => {
            if running {
                out("Parameters are locked while a job is running.".into());
                return Flow::Continue;
            }
            // The change bus notifies the orchestrator with the tree still locked.
            let mut tree = tree.lock();
            let result = resolve_path(&tree, &path).and_then(|p| {
                tree.set_value(&p, Value::from(value))?;
                Ok(p)
            });
            match result.and_then(|p| Ok(render_node(&tree, &p)?)) {
                Ok(summary) => summary.lines.into_iter().take(1).for_each(out),
                Err(e) => out(format!("{e:#}")),
            }
        }
        ShellCommand::Reset(path) => {
            if running {
                out("Parameters are locked while a job is running.".into());
                return Flow::Continue;
            }
            let mut tree = tree.lock();
            match lookup(&tree, path.as_deref()).and_then(|p| Ok(tree.reset(&p)?)) {
                Ok(()) => out("Defaults restored.".into()),
                Err(e) => out(format!("{e:#}")),
            }
        }
        ShellCommand::Open(path) => {
            let _ = cmd_tx.send(UiCommand::Open(path));
        }
        ShellCommand::Run => {
            let _ = cmd_tx.send(UiCommand::Run);
        }
        ShellCommand::Cancel => {
            if !running {
                out("No job is running.".into());
                return Flow::Continue;
            }
            out("Cancel the running job? [y/N]".into());
            if confirmed(next_line()) {
                let _ = cmd_tx.send(UiCommand::Cancel);
            }
        }
        ShellCommand::Save(dest) => {
            let _ = cmd_tx.send(UiCommand::Save(dest));
        }
        ShellCommand::Status => out(render_status(&orchestrator.status())),
        ShellCommand::Params => {
            let snapshot = tree.lock().serialize();
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => out(json),
                Err(e) => out(format!("cannot encode parameters: {e}")),
            }
        }
        ShellCommand::Quit => {
            let _ = cmd_tx.send(UiCommand::Quit);
            return Flow::Quit;
        }
    }
    Flow::Continue
}

fn lookup(tree: &ParamTree, path: Option<&str>) -> Result<ParamPath> {
    match path {
        None => Ok(ParamPath::root()),
        Some(p) => resolve_path(tree, p),
    }
}

fn confirmed(answer: Option<String>) -> bool {
    matches!(
        answer.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("y" | "yes")
    )
}
