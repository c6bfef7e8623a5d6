//! Logging setup for the provider process.
//!
//! The provider's stdout belongs to the orchestrating engine, so every
//! subscriber installed here writes to **stderr**. Filtering follows
//! `RUST_LOG` and falls back to a default directive when it is unset.
//!
//! ```bash
//! # Trace every mapping the codec encodes or decodes
//! RUST_LOG=census_provider::mapping=debug ./terraform-provider-census
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the default subscriber at `info` level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_DIRECTIVE);
}

/// Install the default subscriber, using `default_directive` when
/// `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_directive: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(stderr_layer())
        .init();
}

/// Install the default subscriber unless one is already set.
///
/// Returns `false` when a subscriber was already installed, which is the
/// normal case when several tests share a process.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_DIRECTIVE))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
