//! Tracing subscriber setup for the `reframe` binary.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set. With
/// `config.file` set, events are appended to that file without ANSI colors;
/// if it cannot be opened, logging stays on stderr and a warning is emitted.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    let mut open_failure = None;
    let log_file = config
        .file
        .as_deref()
        .and_then(|path| match open_log_file(path) {
            Ok(file) => Some(file),
            Err(e) => {
                open_failure = Some(format!("{}: {e}", path.display()));
                None
            }
        });

    match (log_file, config.json) {
        (Some(file), true) => install(builder.json().with_writer(Mutex::new(file)).finish()),
        (Some(file), false) => install(
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish(),
        ),
        (None, true) => install(builder.json().finish()),
        (None, false) => install(builder.finish()),
    }

    if let Some(failure) = open_failure {
        tracing::warn!("Cannot open log file {failure}, logging to stderr");
    }
}

fn install<S>(subscriber: S)
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Open `path` for appending, creating it and its parent directory.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
