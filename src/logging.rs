//! Logging setup for the gateway binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host process.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

/// Configured verbosity: 0 = error, 1 = info, 2 = debug, 3+ = trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub u8);

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self.0 {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

impl From<u8> for LogLevel {
    fn from(level: u8) -> Self {
        LogLevel(level)
    }
}

/// Install a fmt subscriber at `level`. `RUST_LOG` directives take
/// precedence. Later calls are no-ops.
pub fn init(level: impl Into<LogLevel>) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into().filter().into())
        .from_env_lossy();
    let _ = Registry::default()
        .with(filter)
        .with(subscriber_fmt::layer().with_target(false).with_thread_names(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel(0).filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel(1).filter(), LevelFilter::INFO);
        assert_eq!(LogLevel(2).filter(), LevelFilter::DEBUG);
        assert_eq!(LogLevel(9).filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(1u8);
        init(LogLevel(2));
    }
}
