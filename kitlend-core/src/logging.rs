//! Logging bootstrap on the `tracing` stack.
//!
//! One daily-rotated file under the log directory plus a compact console
//! layer. The file layer switches to JSON when structured output is wanted.

use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::KitResult;

/// Keeps the non-blocking log writer alive; drop to flush the log file.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber: console + daily-rotated `kitlend.log`.
///
/// `level` takes anything `EnvFilter` understands ("info",
/// "kitlend_realtime=debug", ...); invalid filters fall back to "info".
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> KitResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "kitlend.log"));
    let base = tracing_subscriber::registry()
        .with(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).compact());
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json_output {
        base.with(file_layer.json()).init();
    } else {
        base.with(file_layer).init();
    }

    tracing::info!("logging to {} at level={level}", log_dir.display());
    Ok(LogGuard { _guard: guard })
}

/// Console-only logger for tests and ad-hoc tooling. Safe to call more than
/// once; only the first call installs a subscriber.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logging_is_reentrant() {
        init_console_logging("debug");
        init_console_logging("debug");
    }
}
