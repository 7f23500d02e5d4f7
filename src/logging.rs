//! Per-run logging for the pipeline binaries.
//!
//! Every binary run gets its own log file named after the run
//! (`voxmood-train_2024-05-01_12-00-00.log`) next to a stdout layer. Retention
//! is counted per run name, so a burst of evaluation runs never evicts the
//! logs of the training run that produced the checkpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Log directory {path} is unusable: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove old run log {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid logging.level '{level}': {detail}")]
    Level { level: String, detail: String },
    #[error("Failed to timestamp run log name: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("A global tracing subscriber is already installed: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Start logging for the binary run named `run`, writing into `log_dir`.
///
/// `RUST_LOG` wins over `config.level`. Only the first call installs the
/// subscriber; later calls return `Ok(())` without touching anything.
pub fn init(run: &str, log_dir: &Path, config: &LoggingConfig) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }
    let filter = level_filter(&config.level)?;
    let dir_error = |source: std::io::Error| LoggingError::Dir {
        path: log_dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(log_dir).map_err(dir_error)?;

    let file_name = run_log_name(run, now_local_or_utc())?;
    let log_path = log_dir.join(&file_name);
    let file = fs::File::create(&log_path).map_err(dir_error)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    prune_run_logs(log_dir, run, config.keep_files)?;

    let timer = console_timer();
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_timer(timer.clone()))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("{run} logging to {}", log_path.display());
    Ok(())
}

fn level_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|err| LoggingError::Level {
        level: level.to_string(),
        detail: err.to_string(),
    })
}

fn run_log_name(run: &str, started: OffsetDateTime) -> Result<String, LoggingError> {
    const STAMP: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    Ok(format!("{run}_{}.log", started.format(STAMP)?))
}

/// Logs written by earlier runs named `run`, oldest first.
fn run_logs(dir: &Path, run: &str) -> Result<Vec<PathBuf>, LoggingError> {
    let prefix = format!("{run}_");
    let entries = fs::read_dir(dir).map_err(|source| LoggingError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&prefix) && name.ends_with(".log")
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect();
    logs.sort();
    Ok(logs.into_iter().map(|(_, path)| path).collect())
}

fn prune_run_logs(dir: &Path, run: &str, keep: usize) -> Result<(), LoggingError> {
    let logs = run_logs(dir, run)?;
    let excess = logs.len().saturating_sub(keep.max(1));
    for path in logs.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::Prune { path, source })?;
    }
    Ok(())
}

fn console_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
