//! Diagnostic logging setup.
//!
//! Chat output is written by the renderer; this module only configures the
//! `tracing` subscriber that receives diagnostics from the backends and the
//! session controller.  The level comes from `RUST_LOG` and defaults to
//! `warn` so that diagnostics do not clutter an interactive session.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, Result};

const DEFAULT_FILTER: &str = "warn";

/// Initialize the logging system.
///
/// With `log_file`, diagnostics are appended to that file without ANSI
/// styling; otherwise they go to stderr.  Calling this twice is an error
/// reported by the subscriber registry and is ignored.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| Error::io(format!("failed to open log file {}", path.display()), err))?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .try_init();
        }
        None => {
            let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();
        }
    }

    tracing::debug!("logging initialized");
    Ok(())
}
