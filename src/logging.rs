use std::io::IsTerminal;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const FILE_PREFIX: &str = "backend";

/// Installs the global subscriber: stdout plus a daily `backend.YYYY-MM-DD.log`.
///
/// The returned guard flushes the file writer and must be held until shutdown.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_ansi(use_ansi(&config.style));

    let appender = file_appender(Path::new(&config.dir));
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file_layer)
        .init();

    if guard.is_none() {
        tracing::warn!("File logging unavailable in {}, logging to stdout only", config.dir);
    }
    guard
}

fn use_ansi(style: &str) -> bool {
    match style {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Daily appender in `dir`; retries once with a millisecond-suffixed name.
fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    match build_appender(dir, FILE_PREFIX) {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("Could not open log file in {}: {}", dir.display(), e);
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            build_appender(dir, &format!("{}-{}", FILE_PREFIX, millis)).ok()
        }
    }
}

fn build_appender(
    dir: &Path,
    prefix: &str,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
}
