use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the computed filter
pub const LOG_ENV: &str = "PGPROBE_LOG";

/// Map the `-v` count to a filter directive for this crate
#[must_use]
pub const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Build the filter: `PGPROBE_LOG`, then `RUST_LOG`, then the verbosity level
fn build_env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},sqlx=warn",
                env!("CARGO_CRATE_NAME"),
                level_for(verbosity)
            ))
        })
}

/// Initialize structured logging on stderr, keeping stdout for the report
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(verbosity: u8) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
