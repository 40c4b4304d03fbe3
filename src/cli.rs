//! Command-line interface configuration.

use argh::FromArgs;
use std::{net::SocketAddr, path::PathBuf};

use crate::error::Error;
use crate::middleware::{DEFAULT_MAX_BODY_BYTES, LoggingOptions};

/// Demo API server with JSON request logging
#[derive(Debug, FromArgs)]
pub struct Cli {
    /// server bind address (default: '127.0.0.1:8000')
    #[argh(option, default = "\"127.0.0.1:8000\".parse().unwrap()")]
    pub bind: SocketAddr,

    /// route excluded from request logging, exact path (repeatable)
    #[argh(option, long = "exclude")]
    pub exclude: Vec<String>,

    /// largest request body logged, in bytes (default: 2 MiB)
    #[argh(option, long = "max-body-bytes", default = "DEFAULT_MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// also append JSON lines to this file
    #[argh(option, long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// human-readable colored console output instead of JSON lines
    #[argh(switch)]
    pub pretty: bool,
}

impl Cli {
    pub fn logging_options(&self) -> Result<LoggingOptions, Error> {
        Ok(LoggingOptions::excluding(self.exclude.iter().cloned())?.with_max_body_bytes(self.max_body_bytes))
    }
}
