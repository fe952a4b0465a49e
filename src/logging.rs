//! Tracing setup for the workbench.
//!
//! Records go to systemd's journal on Linux. Elsewhere, or when journald is
//! unreachable, they go to a daily rolling file in the directory chosen by
//! [`Config::log_dir`], which defaults to beside the database.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Install the global subscriber.
///
/// `WORKBENCH_LOG` takes precedence over `[logging] filter`; both use
/// `EnvFilter` syntax (`debug`, `workbench::db=debug,info`, ...).
pub fn init(config: &Config) -> Result<()> {
    let env_filter = filter(config);

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()?;

            tracing::info!(db = %config.db_path.display(), "Logging to journald");
            return Ok(());
        }
    }

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "workbench.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!(dir = %log_dir.display(), db = %config.db_path.display(), "Logging to file");
    Ok(())
}

fn filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_env("WORKBENCH_LOG")
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
