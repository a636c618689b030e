//! Recursive tree enumeration with traversal permission repair.
//!
//! Both entry points walk everything beneath a root, skipping the `.git`
//! metadata subtree. While descending, each visited directory's mode is
//! widened to include user rwx; a prior lock-down or a hostile chmod must
//! never be able to hide part of the tree from the reconciler. File modes
//! are not touched here.

use crate::path_set::PathSet;
use crate::tree_path::TreePath;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const GIT_DIR: &str = ".git";

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

impl WalkError {
    fn from_io(path: &Path, source: std::io::Error) -> WalkError {
        if source.kind() == ErrorKind::PermissionDenied {
            WalkError::PermissionDenied(path.to_path_buf())
        } else {
            WalkError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Every file strictly beneath `root`, excluding the `root/.git` subtree.
pub fn all_files(root: &Path) -> Result<PathSet, WalkError> {
    let (_, files) = walk(root)?;
    Ok(files)
}

/// Every directory strictly beneath `root`, excluding the `root/.git`
/// subtree. The root itself is not included.
pub fn all_dirs(root: &Path) -> Result<PathSet, WalkError> {
    let (dirs, _) = walk(root)?;
    Ok(dirs)
}

fn walk(root: &Path) -> Result<(PathSet, PathSet), WalkError> {
    let mut dirs = PathSet::new();
    let mut files = PathSet::new();
    let git_dir = root.join(GIT_DIR);
    descend(root, &git_dir, &mut dirs, &mut files)?;
    Ok((dirs, files))
}

fn descend(
    current: &Path,
    git_dir: &Path,
    dirs: &mut PathSet,
    files: &mut PathSet,
) -> Result<(), WalkError> {
    repair_traversal_mode(current)?;

    let entries = std::fs::read_dir(current).map_err(|e| WalkError::from_io(current, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| WalkError::from_io(current, e))?;
        let path = entry.path();

        if path == git_dir {
            continue;
        }

        let metadata =
            std::fs::symlink_metadata(&path).map_err(|e| WalkError::from_io(&path, e))?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            dirs.insert(TreePath::Dir(path.clone()));
            descend(&path, git_dir, dirs, files)?;
        } else {
            // Symlinks are listed as files and never followed.
            files.insert(TreePath::File(path));
        }
    }

    Ok(())
}

/// Widen a directory's mode to `mode | 0o700` so it can be entered, listed,
/// and later re-locked. Do not cache modes across visits.
#[cfg(unix)]
fn repair_traversal_mode(dir: &Path) -> Result<(), WalkError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(dir).map_err(|e| WalkError::from_io(dir, e))?;
    if !metadata.is_dir() {
        return Err(WalkError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::other("not a directory"),
        });
    }

    let mode = metadata.permissions().mode();
    if mode & 0o700 != 0o700 {
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode | 0o700))
            .map_err(|e| WalkError::from_io(dir, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn repair_traversal_mode(_dir: &Path) -> Result<(), WalkError> {
    Ok(())
}
