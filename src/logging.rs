//! Diagnostics on stderr through `tracing`.

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter for `-v` repeated `verbosity` times.
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. `filter_override` (from `LLMQ_LOG`) wins
/// over the verbosity flags; an unparseable override falls back to them.
pub fn init(verbosity: u8, filter_override: Option<&str>) {
    let fallback = default_directive(verbosity);
    let filter = filter_override
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .try_init();
}
