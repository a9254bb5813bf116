//! Handling of the retained result after a run completes.

use super::Orchestrator;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// `<input stem>.tre` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("tre")
}

/// Copy the retained tree to `dest`, or to the default path next to the input
/// it was computed from. Returns the written path.
pub fn save_artifact(orchestrator: &Orchestrator, dest: Option<&Path>) -> Result<PathBuf> {
    orchestrator.with_artifact(|artifact| {
        let artifact = artifact.context("no tree to save, run the computation first")?;
        let dest = match dest {
            Some(p) => p.to_path_buf(),
            None => default_output_path(artifact.input_path()),
        };
        std::fs::copy(artifact.path(), &dest)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        tracing::info!(job = %artifact.job(), dest = %dest.display(), "tree saved");
        Ok(dest)
    })
}

/// Contents of the retained tree.
pub fn read_tree(orchestrator: &Orchestrator) -> Result<String> {
    orchestrator.with_artifact(|artifact| {
        let artifact = artifact.context("no tree available")?;
        std::fs::read_to_string(artifact.path())
            .with_context(|| format!("failed to read {}", artifact.path().display()))
    })
}
