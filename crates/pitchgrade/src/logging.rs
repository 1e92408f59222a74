//! Tracing subscriber setup.
//!
//! The library itself logs through the `log` facade; this helper installs
//! a `tracing-subscriber` with a `tracing-log` bridge so the host process
//! gets a single formatted stream. Safe to call more than once.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Filter defaults to `info` and can be overridden via `RUST_LOG`
/// (e.g. `RUST_LOG=pitchgrade=debug`). Returns quietly if a subscriber
/// is already installed.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Route `log` macro output into tracing.
    let _ = tracing_log::LogTracer::init();

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        // Logging through the facade must not panic afterwards.
        log::debug!("logging initialized twice without panic");
    }
}
