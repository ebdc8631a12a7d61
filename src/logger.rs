//! Logging setup on top of `tracing`.
//!
//! The level is picked in this order:
//! 1. `--verbose`: debug for this crate
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. info for this crate

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new("doc_tool=debug")
    } else if quiet {
        EnvFilter::new("doc_tool=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("doc_tool=info"))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(use_color(no_color))
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Colors unless disabled, `NO_COLOR` is set, or stderr is not a terminal.
fn use_color(no_color: bool) -> bool {
    !no_color && std::env::var_os("NO_COLOR").is_none() && atty::is(atty::Stream::Stderr)
}
