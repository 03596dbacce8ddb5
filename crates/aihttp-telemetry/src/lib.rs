//! Log output for aihttp binaries
//!
//! Library crates only emit `tracing` events; installing a subscriber is
//! the host application's call. This crate is the default way to do that.

use aihttp_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global `tracing` subscriber
///
/// The filter comes from `RUST_LOG` when set, then from the config, then
/// from `default_filter`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: Option<&LoggingConfig>, default_filter: &str) -> anyhow::Result<()> {
    let filter = resolve_filter(config, default_filter);
    let format = config.map_or(LogFormat::Text, |c| c.format);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).try_init()
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr);
            registry.with(fmt_layer).try_init()
        }
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn resolve_filter(config: Option<&LoggingConfig>, default_filter: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = config.and_then(|c| c.filter.as_deref()).unwrap_or(default_filter);

    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}
