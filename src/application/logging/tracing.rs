/// Installs the process-wide `tracing_subscriber::Registry` once: an
/// `EnvFilter` layer plus a rolling `tracing-appender` file layer and a
/// stdout layer, mirroring the project's existing logging setup.
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::application::config::Configuration;

static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Idempotent: later calls after the first are no-ops.
pub fn install_logging(config: &Configuration) -> bool {
    if LOGGER_INSTALLED.get().copied().unwrap_or(false) {
        return true;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer();

    let file_appender = tracing_appender::rolling::daily(config.log_dir(), "codegraph-sidecar.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOGGER_GUARD.set(guard);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    let _ = LOGGER_INSTALLED.set(installed);
    installed
}
