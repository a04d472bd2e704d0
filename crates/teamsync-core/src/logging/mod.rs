//! Logging setup for daemon and CLI.
//!
//! Console output goes through `tracing_subscriber::fmt`; the daemon also
//! keeps a machine-readable JSONL trail per node.
//!
//! ```text
//! {data_dir}/logs/
//! ├── 2026-10-19_leader.jsonl
//! └── 2026-10-19_member.jsonl
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use teamsync_core::logging::LoggingBuilder;
//!
//! LoggingBuilder::new("info")
//!     .with_jsonl(config.logs_dir(), "leader")
//!     .init()?;
//! ```
//!
//! `RUST_LOG` always wins over the default filter.

pub mod layer;

pub use layer::{JsonlLayer, LogLine};

use std::path::PathBuf;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Builder for the global tracing subscriber.
pub struct LoggingBuilder {
    default_filter: String,
    console: bool,
    jsonl: Option<(PathBuf, String)>,
}

impl LoggingBuilder {
    /// Start with a default filter directive (e.g. "info", "teamsync_core=debug").
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
            console: true,
            jsonl: None,
        }
    }

    /// Map a `-v` count to a default filter.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let filter = match verbosity {
            0 => "warn",
            1 => "info,tower_http=info",
            2 => "debug,tower_http=debug",
            _ => "trace",
        };
        Self::new(filter)
    }

    /// Disable console output.
    pub fn no_console(mut self) -> Self {
        self.console = false;
        self
    }

    /// Also append events to a JSONL file for `node`.
    pub fn with_jsonl(mut self, logs_dir: impl Into<PathBuf>, node: impl Into<String>) -> Self {
        self.jsonl = Some((logs_dir.into(), node.into()));
        self
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_filter(&self) -> &str {
        &self.default_filter
    }

    /// Install as the global default subscriber.
    pub fn init(self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_filter));

        let jsonl = match &self.jsonl {
            Some((dir, node)) => Some(JsonlLayer::new(dir, node.clone())?),
            None => None,
        };
        let console = self
            .console
            .then(|| {
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
            });

        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .with(jsonl)
            .try_init()?;
        Ok(())
    }
}
