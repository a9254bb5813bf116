//! Application-level orchestration.
//!
//! [`Orchestrator`] is the single event-processing point of the run lifecycle:
//! the parameter tree's change bus, the controller and the engine's completion
//! reports all go through [`Orchestrator::dispatch`]. Front-ends watch the
//! resulting [`Status`] to update their affordances.

mod controller;
mod machine;
mod post_process;

pub use controller::{run_controller, UiCommand};
pub use machine::{Effect, Event, Machine, OutputStatus, Status, TransitionError};
pub use post_process::{default_output_path, read_tree, save_artifact};

use crate::job::{Artifact, WorkspaceFactory};
use crate::param::{ParamError, ParamPath, ParamTree, SubscriptionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Orchestrator {
    machine: Arc<Mutex<Machine>>,
    status_tx: Arc<watch::Sender<Status>>,
}

impl Orchestrator {
    pub fn new(workspaces: WorkspaceFactory) -> Self {
        let machine = Machine::new(workspaces);
        let (status_tx, _) = watch::channel(machine.status());
        Self {
            machine: Arc::new(Mutex::new(machine)),
            status_tx: Arc::new(status_tx),
        }
    }

    /// Apply one event and publish the new status if it changed.
    ///
    /// The change bus calls in here with the tree locked, so the lock order is
    /// tree, then machine. Never lock an attached tree inside [`Self::with_artifact`].
    pub fn dispatch(&self, event: Event) -> Result<Effect, TransitionError> {
        let mut machine = self.machine.lock();
        let result = machine.apply(event);
        let status = machine.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::info!(?status, "status changed");
            *current = status;
            true
        });
        result
    }

    pub fn status(&self) -> Status {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Run `f` against the retained artifact, if any.
    pub fn with_artifact<R>(&self, f: impl FnOnce(Option<&Artifact>) -> R) -> R {
        f(self.machine.lock().artifact())
    }

    /// Subscribe to every change in `tree`, marking a complete result outdated.
    pub fn attach(&self, tree: &mut ParamTree) -> Result<SubscriptionId, ParamError> {
        let orchestrator = self.clone();
        tree.subscribe(
            ParamPath::root(),
            Box::new(move |_change| {
                let _ = orchestrator.dispatch(Event::ConfigChanged);
            }),
        )
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}
