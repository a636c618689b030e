use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A self-contained sync environment: an upstream bare repository fed by a
/// publisher checkout, an isolated HOME, and a working directory for the
/// binary so `gs4.log` never lands in the source tree.
pub struct Fixture {
    _temp: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
    pub workdir: PathBuf,
    pub publisher: PathBuf,
    pub upstream: PathBuf,
    pub repo_dir: PathBuf,
}

impl Fixture {
    /// Build an upstream whose initial tree holds `README.md` and
    /// `lectures/01-intro.md`.
    pub fn new() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let home = root.join("home");
        let workdir = root.join("work");
        let publisher = root.join("publisher");
        let upstream = root.join("upstream.git");
        let repo_dir = root.join("course");
        fs::create_dir(&home).unwrap();
        fs::create_dir(&workdir).unwrap();

        git(&root, &home, &["init", "-b", "main", "publisher"]);
        fs::write(publisher.join("README.md"), "# Course\n").unwrap();
        fs::create_dir(publisher.join("lectures")).unwrap();
        fs::write(publisher.join("lectures/01-intro.md"), "intro\n").unwrap();
        git(&publisher, &home, &["add", "-A"]);
        commit(&publisher, &home, "initial material");

        git(&root, &home, &["clone", "--bare", "publisher", "upstream.git"]);
        // Let blobless clones actually negotiate their filter locally.
        git(&upstream, &home, &["config", "uploadpack.allowfilter", "true"]);
        git(
            &upstream,
            &home,
            &["config", "uploadpack.allowanysha1inwant", "true"],
        );

        Fixture {
            _temp: temp,
            root,
            home,
            workdir,
            publisher,
            upstream,
            repo_dir,
        }
    }

    pub fn upstream_url(&self) -> String {
        format!("file://{}", self.upstream.display())
    }

    /// Stage a file in the publisher checkout; visible upstream after the
    /// next `publish`.
    // The CLI-surface tests never publish follow-up material, so these
    // helpers are intentionally unused there.
    #[allow(dead_code)]
    pub fn write_upstream(&self, rel: &str, content: &str) {
        let path = self.publisher.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Commit everything staged in the publisher and push it upstream.
    #[allow(dead_code)]
    pub fn publish(&self, message: &str) {
        git(&self.publisher, &self.home, &["add", "-A"]);
        commit(&self.publisher, &self.home, message);
        git(
            &self.publisher,
            &self.home,
            &["push", self.upstream.to_str().unwrap(), "main:main"],
        );
    }

    /// The binary, pointed at this fixture's upstream and checkout.
    pub fn sync_cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("git-sync");
        cmd.current_dir(&self.workdir)
            .env("HOME", &self.home)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .arg(self.upstream_url())
            .arg("main")
            .arg(&self.repo_dir);
        cmd
    }

    /// Run a sync and require success.
    #[allow(dead_code)]
    pub fn sync_ok(&self) {
        self.sync_cmd().assert().success();
    }
}

/// Run a git command in `dir`, panicking on failure.
pub fn git(dir: &Path, home: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("HOME", home)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("run git command");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit(dir: &Path, home: &Path, message: &str) {
    git(
        dir,
        home,
        &[
            "-c",
            "user.name=Upstream",
            "-c",
            "user.email=upstream@example.test",
            "commit",
            "-m",
            message,
        ],
    );
}

/// Locate `name.<hex8>` in `parent`, if a backup of `name` exists.
// Some integration test files only exercise the CLI surface, so this helper
// is intentionally unused there.
#[allow(dead_code)]
pub fn find_backup(parent: &Path, name: &str) -> Option<PathBuf> {
    let prefix = format!("{name}.");
    fs::read_dir(parent)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .is_some_and(is_hex8)
        })
}

#[allow(dead_code)]
fn is_hex8(suffix: &str) -> bool {
    suffix.len() == 8
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[allow(dead_code)]
#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}
