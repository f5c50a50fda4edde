//! Tracing output for the experiment runners.
//!
//! Every run logs to the terminal and to `<dir>/har_<timestamp>.log`, with
//! `dir`, the retained file count and the default filter taken from the
//! `[logging]` section of `har.toml`. `RUST_LOG` overrides the filter.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::config::LoggingConfig;

const RUN_LOG_PREFIX: &str = "har";

/// Flushes the file writer when the process exits.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Cannot create log directory {path}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot list run logs in {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot delete expired run log {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot open run log {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot timestamp run log name: {0}")]
    Timestamp(time::error::Format),
    #[error("A tracing subscriber is already installed: {0}")]
    Install(tracing::subscriber::SetGlobalDefaultError),
}

/// Install the stdout and run-log subscriber once per process.
///
/// Runners print the error and keep going without a log file.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    create_log_dir(&config.dir)?;
    let file_name = run_log_name(local_now())?;
    let run_log = config.dir.join(&file_name);
    touch(&run_log)?;
    prune_run_logs(&config.dir, config.max_files)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::never(&config.dir, file_name));
    let timer = local_timer();
    let subscriber = Registry::default()
        .with(env_filter(&config.filter))
        .with(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(std::io::stdout),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        );
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::Install)?;
    let _ = FILE_GUARD.set(guard);

    tracing::info!(path = %run_log.display(), "Run log opened");
    Ok(())
}

fn create_log_dir(dir: &Path) -> Result<(), LoggingError> {
    fs::create_dir_all(dir).map_err(|source| LoggingError::Dir {
        path: dir.to_path_buf(),
        source,
    })
}

fn touch(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
        .map_err(|source| LoggingError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Delete the oldest `.log` files until at most `keep` remain.
fn prune_run_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(dir)
        .map_err(|source| LoggingError::Scan {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    logs.sort_by_key(|(modified, _)| *modified);
    let expired = logs.len().saturating_sub(keep);
    for (_, path) in logs.drain(..expired) {
        fs::remove_file(&path).map_err(|source| LoggingError::Prune { path, source })?;
    }
    Ok(())
}

fn run_log_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const STAMP: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(STAMP).map_err(LoggingError::Timestamp)?;
    Ok(format!("{RUN_LOG_PREFIX}_{stamp}.log"))
}

fn local_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const STAMP: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, STAMP.into())
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};
    use tempfile::tempdir;

    fn log_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
            .count()
    }

    #[test]
    fn run_log_name_is_prefixed_and_timestamped() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(run_log_name(fixed).unwrap(), "har_2023-11-14_22-13-20.log");
    }

    #[test]
    fn pruning_keeps_the_newest_logs() {
        let dir = tempdir().unwrap();
        for idx in 0..12 {
            touch(&dir.path().join(format!("har_{idx}.log"))).unwrap();
            thread::sleep(Duration::from_millis(10));
        }

        prune_run_logs(dir.path(), 10).unwrap();
        assert_eq!(log_count(dir.path()), 10);
        assert!(!dir.path().join("har_0.log").exists());
        assert!(dir.path().join("har_11.log").exists());
    }

    #[test]
    fn nested_log_dir_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("runs").join("logs");
        create_log_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn pruning_leaves_run_outputs_alone() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("progress.csv")).unwrap();
        for idx in 0..3 {
            touch(&dir.path().join(format!("har_{idx}.log"))).unwrap();
        }
        prune_run_logs(dir.path(), 1).unwrap();
        assert!(dir.path().join("progress.csv").exists());
        assert_eq!(log_count(dir.path()), 1);
    }
}
