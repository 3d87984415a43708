use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// `$XDG_STATE_HOME/gitloom/gitloom.log`, falling back to `~/.local/state`.
pub fn default_log_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_STATE_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state")))?;
    Some(base.join("gitloom").join("gitloom.log"))
}

fn default_directive(debug: bool) -> &'static str {
    if debug { "gitloom=debug" } else { "gitloom=info" }
}

/// Routes `tracing` output to `path`; the terminal belongs to the UI. The
/// returned guard flushes buffered lines when dropped, so keep it alive for
/// the whole run. `RUST_LOG` takes precedence over `debug`.
pub fn init(path: &Path, debug: bool) -> Result<WorkerGuard> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_names(true),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}
