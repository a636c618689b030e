//! Thin adapter over the git porcelain.
//!
//! Every operation shells out through the strict-mode runner; nothing here
//! inspects repository internals. Keeping all VCS calls behind this one type
//! means the reconciler never composes a git command line itself.

use crate::shell::{self, ShellError, ShellOptions};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {operation} failed: {source}")]
    Command {
        operation: &'static str,
        #[source]
        source: ShellError,
    },
}

/// Handle on one upstream repository and the branch to track.
#[derive(Debug, Clone)]
pub struct GitClient {
    repo_url: String,
    branch: String,
}

impl GitClient {
    pub fn new(repo_url: &str, branch: &str) -> GitClient {
        GitClient {
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
        }
    }

    /// The remote-tracking ref this client converges the working tree onto.
    pub fn remote_ref(&self) -> String {
        format!("origin/{}", self.branch)
    }

    /// Blobless clone of the tracked branch into `repo_dir`.
    ///
    /// Runs from the parent directory so the clone target can be created
    /// fresh. `repo_dir` must not exist yet.
    pub fn clone_blobless(&self, repo_dir: &Path) -> Result<(), GitError> {
        info!("Cloning {} into {}", self.repo_url, repo_dir.display());

        let parent = match repo_dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let target = repo_dir.file_name().unwrap_or(repo_dir.as_os_str());
        let script = format!(
            "git clone --filter=blob:none --branch {} -- {} {}",
            shell::quote(&self.branch),
            shell::quote(&self.repo_url),
            shell::quote(&target.to_string_lossy()),
        );

        self.run("clone", &script, parent)?;
        Ok(())
    }

    /// Mark `repo_dir` as a safe directory so mixed-ownership hosts do not
    /// refuse to operate on it.
    pub fn configure_safe_directory(&self, repo_dir: &Path) -> Result<(), GitError> {
        let script = format!(
            "git config --global --add safe.directory {}",
            shell::quote(&repo_dir.to_string_lossy()),
        );
        self.run("config safe.directory", &script, repo_dir)?;
        Ok(())
    }

    /// Point `origin` at the configured upstream: delete it if present, then
    /// create it anew.
    pub fn replace_origin(&self, repo_dir: &Path) -> Result<(), GitError> {
        let tolerant = ShellOptions {
            check: false,
            ..ShellOptions::default()
        };
        let removed = shell::run_script("git remote remove origin", repo_dir, &tolerant)
            .map_err(|source| GitError::Command {
                operation: "remote remove",
                source,
            })?;
        if removed.code != 0 {
            debug!("No origin remote to remove");
        }

        let script = format!(
            "git remote add origin {}",
            shell::quote(&self.repo_url)
        );
        self.run("remote add", &script, repo_dir)?;
        Ok(())
    }

    pub fn fetch(&self, repo_dir: &Path) -> Result<(), GitError> {
        let script = format!("git fetch origin {}", shell::quote(&self.branch));
        self.run("fetch", &script, repo_dir)?;
        Ok(())
    }

    /// Unstage everything, leaving the working tree alone.
    pub fn reset_index(&self, repo_dir: &Path) -> Result<(), GitError> {
        self.run("reset", "git reset", repo_dir)?;
        Ok(())
    }

    /// Rebuild the working tree from the index.
    pub fn checkout_worktree(&self, repo_dir: &Path) -> Result<(), GitError> {
        self.run("checkout worktree", "git checkout -- .", repo_dir)?;
        Ok(())
    }

    /// Move the working tree and index onto the remote-tracking ref.
    pub fn checkout_remote_ref(&self, repo_dir: &Path) -> Result<(), GitError> {
        let script = format!("git checkout {}", shell::quote(&self.remote_ref()));
        self.run("checkout", &script, repo_dir)?;
        Ok(())
    }

    /// Porcelain status of the working tree.
    pub fn status(&self, repo_dir: &Path) -> Result<String, GitError> {
        let output = self.run("status", "git status --porcelain", repo_dir)?;
        Ok(output)
    }

    /// Fail unless the working tree is byte-identical to `refname` for all
    /// tracked paths.
    pub fn diff_clean(&self, repo_dir: &Path, refname: &str) -> Result<(), GitError> {
        let script = format!("git diff --exit-code {}", shell::quote(refname));
        self.run("diff", &script, repo_dir)?;
        Ok(())
    }

    fn run(
        &self,
        operation: &'static str,
        script: &str,
        cwd: &Path,
    ) -> Result<String, GitError> {
        let output = shell::run_script(script, cwd, &ShellOptions::default())
            .map_err(|source| GitError::Command { operation, source })?;
        if !output.stderr.is_empty() {
            debug!("git {operation} stderr:\n{}", output.stderr.trim_end());
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_ref_tracks_configured_branch() {
        let git = GitClient::new("https://example.invalid/course.git", "term-2026");

        assert_eq!(git.remote_ref(), "origin/term-2026");
    }
}
