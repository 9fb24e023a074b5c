//! DEX Studio Host Library
//!
//! Runtime that loads DEX Studio extension bundles, exposes the capability
//! API to them and dispatches editor hooks. The editor shell drives a
//! [`PluginHost`] through a [`HostBridge`] implementation; [`LocalBridge`]
//! backs it with the local disk for headless use.

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub use crate::core::bridge::{HostBridge, LocalBridge, LocalBridgeConfig};
pub use crate::core::plugin::{LoadReport, PluginHost, PluginHostConfig};
pub use crate::core::settings::{EditorSettings, SettingsManager};
pub use crate::core::{CoreError, CoreResult};

/// Log file name inside the log directory (rotated daily)
pub const LOG_FILE: &str = "dex-studio.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

// =============================================================================
// Logging
// =============================================================================

/// Installs the global subscriber: a console layer on stderr plus a daily
/// rolling file under `log_dir`. Safe to call more than once. A log
/// directory that cannot be created is reported on the console.
pub fn init_logging(log_dir: &Path) {
    use tracing_subscriber::prelude::*;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .build(log_dir);

    let (file_layer, file_error) = match appender {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    // stdout is reserved for command output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Already initialized in tests or by an embedding shell
    let _ = tracing::subscriber::set_global_default(subscriber);

    if let Some(e) = file_error {
        tracing::warn!("Cannot log to {:?}, file logging is off: {}", log_dir, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        init_logging(dir.path());
        init_logging(dir.path());
        tracing::info!("logging initialized twice");
        assert!(dir.path().exists());
    }

    #[test]
    fn init_logging_survives_an_unusable_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        init_logging(&blocker.join("logs"));
        tracing::info!("still logging to the console");
        assert!(blocker.is_file());
    }
}
