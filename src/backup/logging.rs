use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::run::RUN_TIMESTAMP_FORMAT;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Where console log lines go. Commands whose stdout is meant to be piped log
/// to stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

impl ConsoleTarget {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            ConsoleTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            ConsoleTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Keeps the file writer alive; dropping it flushes and closes the log.
pub struct LogHandle {
    _guard: WorkerGuard,
    path: PathBuf,
}

impl LogHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `<prefix>_<YYYYMMDD_HHMMSS>`; the appender adds the `.log` suffix.
pub fn log_file_stem(prefix: &str, now: &DateTime<Local>) -> String {
    format!("{prefix}_{}", now.format(RUN_TIMESTAMP_FORMAT))
}

/// Logs to the console and to one timestamped file per run under `log_dir`.
///
/// `info` level unless `RUST_LOG` says otherwise.
pub fn setup_logging<P: AsRef<Path>>(
    log_dir: P,
    prefix: &str,
    now: &DateTime<Local>,
    console: ConsoleTarget,
) -> Result<LogHandle> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)
        .map_err(Error::from)
        .with_msg(format!("Failed to create log directory: {log_dir:?}"))?;

    let stem = log_file_stem(prefix, now);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&stem)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| Error::LoggingInit(e.to_string()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_target(false).with_writer(console.make_writer()))
        .try_init()
        .map_err(|e| Error::LoggingInit(e.to_string()))?;

    let path = log_dir.join(format!("{stem}.log"));
    tracing::info!("Logging to {path:?}");
    Ok(LogHandle {
        _guard: guard,
        path,
    })
}
