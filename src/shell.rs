//! Strict-mode shell script execution.
//!
//! Every VCS porcelain invocation goes through here, as do the few
//! filesystem operations where a shell is more ergonomic than individual
//! syscalls. The contract: the caller's script runs under `set -eux -o
//! pipefail` from a temporary file scoped to the call, in a given working
//! directory, with output captured and a hard wall-clock timeout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_INTERPRETER: &str = "/bin/bash";
const DEFAULT_PREAMBLE: &str = "set -eux -o pipefail";

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("script did not finish within {}s", timeout.as_secs())]
    Timeout { timeout: Duration },
    #[error("script exited with status {code}:\n{stderr}")]
    Failed { code: i32, stderr: String },
}

#[derive(Debug, Clone)]
pub struct ShellOptions {
    pub timeout: Duration,
    pub interpreter: PathBuf,
    pub preamble: String,
    /// Fail the call on a non-zero exit code.
    pub check: bool,
    /// Capture the child's stdout and stderr as strings.
    pub capture: bool,
}

impl Default for ShellOptions {
    fn default() -> ShellOptions {
        ShellOptions {
            timeout: DEFAULT_TIMEOUT,
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            preamble: DEFAULT_PREAMBLE.to_string(),
            check: true,
            capture: true,
        }
    }
}

#[derive(Debug)]
pub struct ShellOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Quote a string for safe interpolation into a bash script.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Run a script body in `cwd` under the options' strict-mode preamble.
///
/// The preamble and body are written to a temporary file whose lifetime is
/// scoped to this call. A child still running at the timeout is killed and
/// the call fails with `ShellError::Timeout`. With `check` set, a non-zero
/// exit code fails the call carrying the captured stderr.
pub fn run_script(body: &str, cwd: &Path, options: &ShellOptions) -> Result<ShellOutput, ShellError> {
    let mut script = tempfile::NamedTempFile::new()?;
    writeln!(script, "{}", options.preamble)?;
    writeln!(script, "{body}")?;
    script.as_file().sync_all()?;

    debug!("Running script in {}:\n{}", cwd.display(), body.trim_end());
    let started = Instant::now();

    let mut command = Command::new(&options.interpreter);
    command.arg(script.path()).current_dir(cwd);
    if options.capture {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }
    command.stdin(Stdio::null());

    let mut child = command.spawn()?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let deadline = started + options.timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                child.kill()?;
                child.wait()?;
                return Err(ShellError::Timeout {
                    timeout: options.timeout,
                });
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);
    let code = status.code().unwrap_or(-1);

    debug!(
        "Script finished with status {code} after {}ms",
        started.elapsed().as_millis()
    );

    if options.check && !status.success() {
        return Err(ShellError::Failed { code, stderr });
    }

    Ok(ShellOutput {
        code,
        stdout,
        stderr,
    })
}

fn spawn_reader<R: std::io::Read + Send + 'static>(mut source: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        buffer
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(handle) => String::from_utf8_lossy(&handle.join().unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}
