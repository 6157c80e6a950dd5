//! Tracing subscriber setup
//!
//! Logs go to stderr so stdout carries only query responses. `RUST_LOG`
//! overrides the verbosity-derived default filter.

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::LogFormat;

static INIT: Once = Once::new();

/// Build the filter: `RUST_LOG` when set and valid, else `default_directive`
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber; later calls are no-ops
pub fn init_tracing(format: LogFormat, default_directive: &str) {
    let filter = env_filter(default_directive);

    INIT.call_once(|| match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}
