mod cli;
mod git;
mod instructions;
mod path_set;
mod shell;
mod status;
mod sync;
mod tree_path;
mod walk;

use anyhow::Context;
use cli::Cli;
use std::fmt as stdfmt;
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use sync::Syncer;
use tracing::{error, info, Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

const LOG_FILE: &str = "gs4.log";
const FAILED_LOG_FILE: &str = "gs4.failed.log";
const OPT_OUT_MARKER: &str = ".git-sync-off";

/// Marker target for invariant-violation events. `tracing` has no level
/// above `ERROR`, so events emitted with this target render as `CRITICAL`
/// in the log format instead of their nominal level.
pub(crate) const CRITICAL_TARGET: &str = "critical";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_file = match File::create(LOG_FILE) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open {LOG_FILE}: {e}");
            return ExitCode::from(1);
        }
    };
    init_tracing(cli.verbose, log_file);

    if opt_out_requested() {
        info!("Found ~/{OPT_OUT_MARKER}, skipping sync");
        discard_log();
        return ExitCode::SUCCESS;
    }

    let started = Instant::now();
    let result = run(&cli);
    if cli.profile {
        info!("Sync took {}ms", started.elapsed().as_millis());
    }

    match result {
        Ok(()) => {
            info!("Sync finished");
            discard_log();
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            preserve_log(&cli.repo_dir);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut syncer = Syncer::new(&cli.repo_url, &cli.branch, &cli.repo_dir)
        .context("failed to construct syncer")?;
    syncer.sync()?;
    Ok(())
}

/// An empty (or any) marker file in the invoking user's home directory
/// turns the whole tool into a no-op.
fn opt_out_requested() -> bool {
    match std::env::var_os("HOME") {
        Some(home) => Path::new(&home).join(OPT_OUT_MARKER).exists(),
        None => false,
    }
}

/// A successful run leaves no log behind.
fn discard_log() {
    let _ = std::fs::remove_file(LOG_FILE);
}

/// A failed run parks the log inside the checkout, where the next sync will
/// preserve it like any other user artifact.
fn preserve_log(repo_dir: &Path) {
    if repo_dir.is_dir() {
        let _ = std::fs::rename(LOG_FILE, repo_dir.join(FAILED_LOG_FILE));
    }
}

fn init_tracing(verbose: bool, log_file: File) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = tracing_fmt::layer()
        .event_format(PlainFormatter)
        .with_writer(Arc::new(log_file));

    // Every message is mirrored to standard output.
    let stdout_layer = tracing_fmt::layer()
        .event_format(PlainFormatter)
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// `<LEVEL> - <message>`, with no timestamps or targets, so the log file
/// stays diffable between runs. Invariant-violation events carry the
/// `CRITICAL_TARGET` marker and print as their own severity above `ERROR`.
struct PlainFormatter;

impl<S, N> FormatEvent<S, N> for PlainFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let metadata = event.metadata();
        if metadata.target() == CRITICAL_TARGET {
            writer.write_str("CRITICAL - ")?;
        } else {
            write!(writer, "{} - ", metadata.level())?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
