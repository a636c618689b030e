//! Path abstraction distinguishing files from directories at the type level.
//!
//! The file-vs-directory distinction is load-bearing for the reconciler: it
//! controls which concatenations are legal and whether a restore moves a
//! single file or a whole subtree. The kind is carried alongside the textual
//! path so downstream logic never has to re-probe the filesystem to tell a
//! renamed file from a renamed directory.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TreePathError {
    #[error("cannot join onto a file path: {0}")]
    JoinOntoFile(PathBuf),
    #[error("path has no filename component: {0}")]
    NoFileName(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A filesystem path tagged with its kind.
///
/// The tag records what the path *is* (or is expected to become), not a
/// cached `stat` result: every existence or mode query goes back to the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreePath {
    File(PathBuf),
    Dir(PathBuf),
}

impl TreePath {
    /// Construct by probing the filesystem for the concrete kind.
    ///
    /// A path that exists as neither file nor directory defaults to the
    /// directory kind, matching the concatenation rules for plain names.
    pub fn from_disk(path: impl Into<PathBuf>) -> TreePath {
        let path = path.into();
        if path.is_file() {
            TreePath::File(path)
        } else {
            TreePath::Dir(path)
        }
    }

    pub fn as_path(&self) -> &Path {
        match self {
            TreePath::File(p) | TreePath::Dir(p) => p,
        }
    }

    pub fn is_dir_kind(&self) -> bool {
        matches!(self, TreePath::Dir(_))
    }

    pub fn is_file_kind(&self) -> bool {
        matches!(self, TreePath::File(_))
    }

    /// Whether anything exists on disk at this path, of either kind.
    pub fn exists(&self) -> bool {
        self.as_path().symlink_metadata().is_ok()
    }

    /// Concatenate a relative path onto a directory path.
    ///
    /// Directory + file yields a file, directory + directory yields a
    /// directory. A file path on the left is a well-defined error.
    pub fn join(&self, rel: &TreePath) -> Result<TreePath, TreePathError> {
        let base = match self {
            TreePath::Dir(p) => p,
            TreePath::File(p) => return Err(TreePathError::JoinOntoFile(p.clone())),
        };

        let joined = base.join(rel.as_path());
        Ok(match rel {
            TreePath::File(_) => TreePath::File(joined),
            TreePath::Dir(_) => TreePath::Dir(joined),
        })
    }

    /// Concatenate a plain name onto a directory path, resolving the kind by
    /// probing the filesystem. Neither-file-nor-directory defaults to the
    /// directory kind.
    pub fn join_name(&self, name: &str) -> Result<TreePath, TreePathError> {
        let base = match self {
            TreePath::Dir(p) => p,
            TreePath::File(p) => return Err(TreePathError::JoinOntoFile(p.clone())),
        };

        Ok(TreePath::from_disk(base.join(name)))
    }

    /// Extend the final path component with a suffix string, preserving the
    /// kind. Used for `<original>.<hex8>` backup names on files and
    /// directories alike.
    pub fn with_suffix(&self, suffix: &str) -> Result<TreePath, TreePathError> {
        let path = self.as_path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TreePathError::NoFileName(path.to_path_buf()))?;

        let extended = path.with_file_name(format!("{name}{suffix}"));
        Ok(match self {
            TreePath::File(_) => TreePath::File(extended),
            TreePath::Dir(_) => TreePath::Dir(extended),
        })
    }

    /// Split off the trailing `.<component>` from the final path component,
    /// preserving the kind. Returns `None` when the name has no dot to
    /// strip.
    pub fn strip_suffix(&self) -> Option<TreePath> {
        let path = self.as_path();
        let name = path.file_name()?.to_str()?;
        let (stem, _suffix) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }

        let stripped = path.with_file_name(stem);
        Some(match self {
            TreePath::File(_) => TreePath::File(stripped),
            TreePath::Dir(_) => TreePath::Dir(stripped),
        })
    }

    /// The containing directory, when there is one.
    pub fn parent(&self) -> Option<TreePath> {
        let parent = self.as_path().parent()?;
        if parent.as_os_str().is_empty() {
            return None;
        }
        Some(TreePath::Dir(parent.to_path_buf()))
    }

    /// Rename this path to a sibling location on disk.
    pub fn rename_to(&self, dest: &TreePath) -> Result<(), TreePathError> {
        fs::rename(self.as_path(), dest.as_path()).map_err(|source| TreePathError::Io {
            path: self.as_path().to_path_buf(),
            source,
        })
    }

    /// Apply a transformation to this path's permission bits.
    #[cfg(unix)]
    pub fn chmod(&self, transform: impl FnOnce(u32) -> u32) -> Result<(), TreePathError> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.as_path();
        let io_err = |source| TreePathError::Io {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(path).map_err(io_err)?;
        let mode = metadata.permissions().mode();
        let new_mode = transform(mode);
        if new_mode != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(new_mode)).map_err(io_err)?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn chmod(&self, _transform: impl FnOnce(u32) -> u32) -> Result<(), TreePathError> {
        Ok(())
    }

    /// Read the file's contents as UTF-8 text. File kind only.
    pub fn read_text(&self) -> Result<String, TreePathError> {
        match self {
            TreePath::File(p) => fs::read_to_string(p).map_err(|source| TreePathError::Io {
                path: p.clone(),
                source,
            }),
            TreePath::Dir(p) => Err(TreePathError::NoFileName(p.clone())),
        }
    }

    /// Write text to the file, creating or truncating it. File kind only.
    pub fn write_text(&self, text: &str) -> Result<(), TreePathError> {
        match self {
            TreePath::File(p) => fs::write(p, text).map_err(|source| TreePathError::Io {
                path: p.clone(),
                source,
            }),
            TreePath::Dir(p) => Err(TreePathError::NoFileName(p.clone())),
        }
    }
}

// Order by textual path first so sorted collections iterate in path order;
// the kind only breaks ties between a file and a directory of the same name.
impl Ord for TreePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_path()
            .cmp(other.as_path())
            .then_with(|| self.is_dir_kind().cmp(&other.is_dir_kind()))
    }
}

impl PartialOrd for TreePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreePath::File(p) => write!(f, "{}", p.display()),
            TreePath::Dir(p) => write!(f, "{}/", p.display()),
        }
    }
}
