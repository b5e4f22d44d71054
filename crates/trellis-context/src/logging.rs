//! Logging bootstrap
//!
//! Library code only emits `tracing` events. Binaries call one of these
//! once at startup to see them.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber capped at `level`. Returns false when a
/// global subscriber is already set.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .is_ok()
}

/// Like [`init_logging`] but filtered by `RUST_LOG`, falling back to
/// `default_directives` when it is unset or invalid.
pub fn init_env_logging(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_logging(Level::DEBUG);
        assert!(!init_logging(Level::INFO));
        assert!(!init_env_logging("info"));
    }
}
