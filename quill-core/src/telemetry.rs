//! Logging bootstrap.
//!
//! Installs a global `tracing` subscriber once per process. `RUST_LOG` takes
//! precedence over the configured level. Calling [`init`] again is a no-op.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::{GeneralConfig, TelemetryConfig};
use crate::error::{QuillError, Result};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber.
///
/// # Errors
/// Returns `QuillError::Config` if the level is not a valid filter directive
/// or another subscriber was installed by someone else.
pub fn init(general: &GeneralConfig, telemetry: &TelemetryConfig) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&general.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if telemetry.json_logs {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| QuillError::Config(format!("logging already configured: {e}")))?;

    let _ = INSTALLED.set(());
    tracing::debug!(level = %general.log_level, json = telemetry.json_logs, "Logging initialised");
    Ok(())
}

/// Parse a level such as `info` or a full directive such as `quill_core=debug`.
///
/// # Errors
/// Returns `QuillError::Config` for an unparsable directive.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level.trim())
        .map_err(|e| QuillError::Config(format!("invalid log level `{level}`: {e}")))
}
