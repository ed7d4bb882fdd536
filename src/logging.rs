use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::shared::paths::ensure_dir;

/// Target used by every event the capture pipeline emits.
pub const RECORDER_TARGET: &str = "recorder";

/// Guards that must be kept alive to ensure logs are flushed
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    Directory(#[from] std::io::Error),
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Routes `recorder` events to recorder.log and everything else to system.log
struct TargetWriter {
    recorder_writer: NonBlocking,
    system_writer: NonBlocking,
}

impl<'a> MakeWriter<'a> for TargetWriter {
    type Writer = Box<dyn std::io::Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        Box::new(self.system_writer.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        if is_recorder_target(meta.target()) {
            return Box::new(self.recorder_writer.clone());
        }

        Box::new(self.system_writer.clone())
    }
}

fn is_recorder_target(target: &str) -> bool {
    target
        .strip_prefix(RECORDER_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Initialize daily-rotated file logging under `log_dir`
pub fn init_logging(log_dir: &Path) -> Result<LoggingGuards, LoggingError> {
    ensure_dir(log_dir)?;

    let recorder_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "recorder.log");
    let (recorder_writer, recorder_guard) = tracing_appender::non_blocking(recorder_appender);

    let system_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "system.log");
    let (system_writer, system_guard) = tracing_appender::non_blocking(system_appender);

    let writer = TargetWriter {
        recorder_writer,
        system_writer,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    tracing::info!(target: "system", "Logging initialized at {:?}", log_dir);

    Ok(LoggingGuards {
        _guards: vec![recorder_guard, system_guard],
    })
}
