//! Crate error type.

use thiserror::Error;

/// Failures surfaced by sinks and startup configuration.
///
/// Logging never fails an HTTP exchange: the [`Logger`](crate::logger::Logger)
/// reports sink errors through `tracing` and moves on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("sink lock poisoned")]
    Poisoned,
}
