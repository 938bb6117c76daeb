//! Subscriber setup for the binary
//!
//! The library only emits `tracing` events; nothing here runs unless a caller
//! asks for it. Logs go to stderr so stdout carries the response alone.

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, LOG_LEVELS};
use crate::errors::{PipeProbeError, Result};

/// Shift `base` by `verbosity` steps towards `trace` (negative: towards `error`)
///
/// Unknown base levels count as `info`; the result is clamped to the known
/// levels.
pub fn level_for_verbosity(base: &str, verbosity: i32) -> &'static str {
    let base_index = LOG_LEVELS
        .iter()
        .position(|level| *level == base)
        .unwrap_or(2) as i32;
    let index = base_index
        .saturating_add(verbosity)
        .clamp(0, LOG_LEVELS.len() as i32 - 1);
    LOG_LEVELS[index as usize]
}

/// Filter for `level`, unless `RUST_LOG` is set
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber described by `config` and `verbosity`
pub fn init_logging(config: &LoggingConfig, verbosity: i32) -> Result<()> {
    let level = level_for_verbosity(&config.level, verbosity);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.structured {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    installed.map_err(|e| {
        PipeProbeError::configuration(format!("Failed to install log subscriber: {}", e))
    })
}
