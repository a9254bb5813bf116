//! Configure FastTree's parameters and supervise isolated tree-inference runs.
//!
//! [`param`] holds the typed parameter model, [`orchestrator`] the job state
//! machine and its controller task, and [`engine`] the supervised FastTree
//! process. The binary wires them to a batch runner and a line shell.

pub mod cli;
pub mod engine;
pub mod job;
pub mod model;
pub mod orchestrator;
pub mod param;
pub mod params;
pub mod settings;
mod shell;
mod text_summary;

pub use engine::{ComputationFailure, Engine};
pub use job::{Artifact, JobHandle, JobId, WorkspaceFactory};
pub use model::RunConfig;
pub use orchestrator::{Event, Orchestrator, OutputStatus, Status, UiCommand};
pub use param::{ParamError, ParamMap, ParamPath, ParamTree, Value};
