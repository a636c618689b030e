//! Instructions emitter.
//!
//! After a sync the user should find a short explanation of what just
//! happened to their checkout, both inside the repository and next to it.
//! The text ships as `SYNC-INSTRUCTIONS.md` beside the executable; builds
//! that run straight out of a target directory fall back to the embedded
//! copy of the same text.

use crate::tree_path::{TreePath, TreePathError};
use std::path::Path;
use tracing::debug;

pub const INSTRUCTIONS_FILE: &str = "SYNC-INSTRUCTIONS.md";

const EMBEDDED_INSTRUCTIONS: &str = include_str!("../SYNC-INSTRUCTIONS.md");

/// Copy the instructions file into `repo_dir` and its parent directory,
/// overwriting any existing contents at either destination.
pub fn install(program_dir: &Path, repo_dir: &Path) -> Result<(), TreePathError> {
    let text = load(program_dir)?;
    let repo_dir = TreePath::Dir(repo_dir.to_path_buf());

    let inside = TreePath::File(repo_dir.as_path().join(INSTRUCTIONS_FILE));
    debug!("Writing {inside}");
    inside.write_text(&text)?;

    if let Some(parent) = repo_dir.parent() {
        let beside = TreePath::File(parent.as_path().join(INSTRUCTIONS_FILE));
        debug!("Writing {beside}");
        beside.write_text(&text)?;
    }

    Ok(())
}

fn load(program_dir: &Path) -> Result<String, TreePathError> {
    let sidecar = TreePath::File(program_dir.join(INSTRUCTIONS_FILE));
    if sidecar.exists() {
        sidecar.read_text()
    } else {
        Ok(EMBEDDED_INSTRUCTIONS.to_string())
    }
}
