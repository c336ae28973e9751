//! Log output for the relay binary.
//!
//! - Filtering rules come from `RUST_LOG`, defaulting to `info`.
//! - Events carry thread id, file and line number.
//! - Timestamps use local time in RFC 3339 format.
//! - Output is either human-readable (`pretty`) or one JSON object per line.

use super::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::ChronoLocal::rfc_3339());

    match format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
