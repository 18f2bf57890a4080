//! Structured logging setup: a `tracing_subscriber` registry with an
//! env-driven filter and a stderr `fmt` layer. No OTLP/collector export —
//! this crate has no CLI flag or collector endpoint to wire one to; a
//! consuming binary can still layer its own subscriber on top.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a stderr-writing subscriber driven by `RUST_LOG`, defaulting to
/// `info`-level logging for this crate and `warn` elsewhere. Safe to call
/// more than once (e.g. from multiple tests in the same process) — a second
/// call is a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("classgrove=info,warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
