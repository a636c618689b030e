//! The reconciliation engine.
//!
//! `Syncer::sync` brings a local checkout to the upstream branch's exact
//! tree while preserving every user-originated artifact. User artifacts are
//! renamed to a timestamped backup name before the tree is moved, then
//! restored to their original names wherever that does not collide with
//! upstream content. The run finishes by locking upstream-owned files
//! read-only and validating that the tree converged.
//!
//! The update path is wrapped in a catch-all recovery: any failure sets the
//! whole damaged checkout aside under the same timestamped naming and falls
//! back to a fresh clone, so a broken tree can never block the next sync.

use crate::git::{GitClient, GitError};
use crate::instructions::{self, INSTRUCTIONS_FILE};
use crate::path_set::PathSet;
use crate::status::{self, ChangeKind};
use crate::tree_path::{TreePath, TreePathError};
use crate::walk::{self, WalkError};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("walk error: {0}")]
    Walk(#[from] WalkError),
    #[error("path error: {0}")]
    Path(#[from] TreePathError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown status code: {line:?}")]
    UnknownStatus { line: String },
    #[error("working tree did not converge, unexpected status entry: {line:?}")]
    NotConverged { line: String },
}

/// State for one sync invocation.
///
/// Constructed empty, populated from disk, mutated through classification
/// and restore, then discarded with the process. The only state that
/// survives between invocations is the on-disk tree itself.
pub struct Syncer {
    repo_dir: PathBuf,
    program_dir: PathBuf,
    /// Process-global backup suffix, eight lowercase hex digits derived
    /// from seconds-since-epoch at startup. Restore strips exactly one
    /// `.<component>` so the suffix must be identical for the whole run.
    stamp: String,
    git: GitClient,
    all_dirs: PathSet,
    all_files: PathSet,
    user_dirs: PathSet,
    user_files: PathSet,
    backups: PathSet,
}

impl Syncer {
    pub fn new(repo_url: &str, branch: &str, repo_dir: &Path) -> std::io::Result<Syncer> {
        let exe = std::env::current_exe()?;
        let program_dir = exe.parent().unwrap_or(Path::new(".")).to_path_buf();

        Ok(Syncer {
            repo_dir: repo_dir.to_path_buf(),
            program_dir,
            stamp: startup_stamp(),
            git: GitClient::new(repo_url, branch),
            all_dirs: PathSet::new(),
            all_files: PathSet::new(),
            user_dirs: PathSet::new(),
            user_files: PathSet::new(),
            backups: PathSet::new(),
        })
    }

    /// Converge the checkout onto `origin/<branch>`.
    ///
    /// On return the working tree matches upstream for all upstream-owned
    /// paths, every user artifact is restored or retained under its backup
    /// name, upstream files are read-only, upstream directories are
    /// user-writable, and the instructions file is installed in the
    /// repository and beside it.
    pub fn sync(&mut self) -> Result<(), SyncError> {
        if !self.repo_dir.exists() {
            self.fresh_clone()?;
        } else if let Err(err) = self.update() {
            error!("Updating failed: {err}");
            self.quarantine_tree()?;
            self.fresh_clone()?;
        }

        self.finalize()
    }

    fn fresh_clone(&mut self) -> Result<(), SyncError> {
        self.git.clone_blobless(&self.repo_dir)?;
        self.git.configure_safe_directory(&self.repo_dir)?;
        self.git.fetch(&self.repo_dir)?;
        Ok(())
    }

    /// The ordered update sequence over an existing checkout. Any error
    /// here is caught by `sync` and answered with quarantine-and-reclone.
    fn update(&mut self) -> Result<(), SyncError> {
        info!("Updating existing checkout at {}", self.repo_dir.display());

        self.refresh_tree()?;

        let status_output = self.git.status(&self.repo_dir)?;
        self.classify(&status_output)?;
        self.refresh_tree()?;

        self.git.replace_origin(&self.repo_dir)?;
        self.git.configure_safe_directory(&self.repo_dir)?;
        self.git.fetch(&self.repo_dir)?;

        self.git.reset_index(&self.repo_dir)?;
        self.git.checkout_worktree(&self.repo_dir)?;
        self.git.checkout_remote_ref(&self.repo_dir)?;

        self.refresh_tree()?;
        self.restore_backups()?;

        Ok(())
    }

    /// Re-enumerate the tree. The walk also repairs directory traversal
    /// permissions, so this doubles as the permission-repair pass.
    fn refresh_tree(&mut self) -> Result<(), SyncError> {
        self.all_dirs = walk::all_dirs(&self.repo_dir)?;
        self.all_files = walk::all_files(&self.repo_dir)?;
        debug!(
            "Tree holds {} directories and {} files",
            self.all_dirs.len(),
            self.all_files.len()
        );
        Ok(())
    }

    /// Classify every status entry, backing up each user artifact under its
    /// timestamped name.
    fn classify(&mut self, status_output: &str) -> Result<(), SyncError> {
        for line in status::parse_porcelain(status_output) {
            match line.kind {
                // The upcoming checkout restores deletions, and a rename's
                // new name shows up separately as untracked.
                ChangeKind::Deleted | ChangeKind::Renamed => continue,
                ChangeKind::Unknown => {
                    error!("Unclassifiable status output:\n{status_output}");
                    return Err(SyncError::UnknownStatus { line: line.raw });
                }
                ChangeKind::Untracked
                | ChangeKind::Added
                | ChangeKind::Modified
                | ChangeKind::Copied
                | ChangeKind::Typechange
                | ChangeKind::Updated => self.back_up(&line.path)?,
            }
        }
        Ok(())
    }

    /// Rename one artifact to its backup name and record it as user-owned.
    /// Directory backups record the whole subtree.
    fn back_up(&mut self, rel: &TreePath) -> Result<(), SyncError> {
        let combined = TreePath::Dir(self.repo_dir.clone()).join(rel)?;
        let backup = combined.with_suffix(&format!(".{}", self.stamp))?;

        info!("Backing up {combined} as {backup}");
        combined.rename_to(&backup)?;

        self.backups.insert(backup.clone());
        match &backup {
            TreePath::File(_) => {
                self.user_files.insert(backup.clone());
            }
            TreePath::Dir(path) => {
                self.user_dirs.insert(backup.clone());
                self.user_dirs.extend(walk::all_dirs(path)?);
                self.user_files.extend(walk::all_files(path)?);
            }
        }
        Ok(())
    }

    /// Rename backups to their original names wherever upstream did not
    /// claim the name; collisions keep the backup in place.
    fn restore_backups(&mut self) -> Result<(), SyncError> {
        let pending: Vec<TreePath> = self.backups.iter().cloned().collect();

        for backup in pending {
            let Some(original) = backup.strip_suffix() else {
                continue;
            };

            if original.exists() {
                info!("Keeping backup {backup}: {original} is owned upstream");
                continue;
            }

            info!("Restoring {backup} to {original}");
            backup.rename_to(&original)?;
            self.backups.remove(&backup);

            if original.is_file_kind() {
                self.user_files.remove(&backup);
                self.user_files.insert(original);
            } else {
                self.user_dirs.remove_under(&backup);
                self.user_files.remove_under(&backup);
                self.user_dirs.extend(walk::all_dirs(original.as_path())?);
                self.user_files.extend(walk::all_files(original.as_path())?);
                self.user_dirs.insert(original);
            }
        }

        if !self.backups.is_empty() {
            info!("Backups kept due to name collisions:\n{}", self.backups);
        }
        debug!(
            "User artifacts after restore:\n{}",
            self.user_dirs.union(&self.user_files)
        );
        Ok(())
    }

    /// Set the entire damaged checkout aside as a single timestamped user
    /// artifact so a fresh clone can take its place.
    fn quarantine_tree(&mut self) -> Result<(), SyncError> {
        let tree = TreePath::from_disk(&self.repo_dir);
        if tree.as_path().is_dir() {
            tree.chmod(|m| m | 0o700)?;
        }

        let backup = tree.with_suffix(&format!(".{}", self.stamp))?;
        warn!("Setting aside damaged checkout {tree} as {backup}");
        tree.rename_to(&backup)?;

        self.all_dirs.clear();
        self.all_files.clear();
        self.user_dirs.clear();
        self.user_files.clear();
        self.backups.clear();
        Ok(())
    }

    /// Unconditional final phase: validate convergence, lock upstream
    /// content, install the instructions file, validate again. Failures
    /// here are invariant violations and surface as errors, never as a
    /// re-clone.
    fn finalize(&mut self) -> Result<(), SyncError> {
        self.refresh_tree()?;
        self.validate(true)?;
        self.lock_tree()?;
        instructions::install(&self.program_dir, &self.repo_dir)?;
        self.validate(false)
    }

    /// Every status entry must be untracked: backups and the instructions
    /// file are untracked by design, anything else means the tree did not
    /// converge. With `diff` set, additionally require the working tree to
    /// be byte-identical to the remote-tracking ref.
    ///
    /// Violations here are failures of the tool's own invariants, logged at
    /// `CRITICAL` severity and never answered with a re-clone.
    fn validate(&self, diff: bool) -> Result<(), SyncError> {
        let status_output = self.git.status(&self.repo_dir)?;
        for line in status::parse_porcelain(&status_output) {
            if line.kind != ChangeKind::Untracked {
                error!(
                    target: crate::CRITICAL_TARGET,
                    "Working tree did not converge: {}",
                    line.raw
                );
                return Err(SyncError::NotConverged { line: line.raw });
            }
        }

        if diff {
            if let Err(err) = self.git.diff_clean(&self.repo_dir, &self.git.remote_ref()) {
                error!(
                    target: crate::CRITICAL_TARGET,
                    "Checkout diverges from {}: {err}",
                    self.git.remote_ref()
                );
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Clear write bits on upstream-owned files and keep upstream-owned
    /// directories traversable. User-classified paths are left alone.
    fn lock_tree(&self) -> Result<(), SyncError> {
        let dirs = self.git_dirs();
        let files = self.git_files()?;
        info!(
            "Locking {} files, keeping {} directories traversable",
            files.len(),
            dirs.len()
        );

        for dir in &dirs {
            dir.chmod(|mode| mode | 0o700)?;
        }
        for file in &files {
            file.chmod(|mode| mode & !0o222)?;
        }
        Ok(())
    }

    /// Upstream-owned files: everything on disk minus user files and the
    /// instructions file.
    fn git_files(&self) -> Result<PathSet, SyncError> {
        let mut reserved = PathSet::new();
        reserved.insert(TreePath::Dir(self.repo_dir.clone()).join_name(INSTRUCTIONS_FILE)?);
        Ok(self
            .all_files
            .difference(&self.user_files)
            .difference(&reserved))
    }

    /// Upstream-owned directories: everything on disk minus user dirs.
    fn git_dirs(&self) -> PathSet {
        self.all_dirs.difference(&self.user_dirs)
    }
}

/// Eight lowercase hex digits from seconds-since-epoch, derived once per
/// process so every backup in one invocation shares the same suffix.
fn startup_stamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{:08x}", secs as u32)
}
