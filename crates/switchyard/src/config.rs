//! Process configuration for publisher binaries.
//!
//! [`PublisherArgs`] is a clap argument group a binary flattens into its own
//! parser; [`PublisherConfig`] is the resolved, serde-friendly result.
//!
//! ```rust
//! use clap::Parser;
//! use switchyard::config::PublisherArgs;
//!
//! #[derive(Parser)]
//! #[command(disable_help_flag = true)]
//! struct Cli {
//!     #[command(flatten)]
//!     publisher: PublisherArgs,
//! }
//!
//! let cli = Cli::parse_from(["shop", "--format", "yaml", "articles", "list"]);
//! let config = cli.publisher.config();
//! assert_eq!(config.port, 8000);
//! assert_eq!(cli.publisher.command, vec!["articles", "list"]);
//! ```

use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LOG: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Run the HTTP channel instead of dispatching a CLI command.
    pub serve: bool,
    pub host: String,
    pub port: u16,
    pub format: OutputFormat,
    /// `tracing` filter directive.
    pub log: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            serve: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            format: OutputFormat::Json,
            log: DEFAULT_LOG.to_string(),
        }
    }
}

impl PublisherConfig {
    /// `host:port` for the HTTP listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command-line options shared by publisher binaries.
///
/// Everything after the options is the channel command line, passed through
/// untouched (including `--help` and `--complete`).
#[derive(Debug, Clone, clap::Args)]
pub struct PublisherArgs {
    /// Serve the HTTP channel.
    #[arg(long)]
    pub serve: bool,

    /// HTTP listen host.
    #[arg(long, env = "SWITCHYARD_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// HTTP listen port.
    #[arg(long, env = "SWITCHYARD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Output format for call results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Log filter, e.g. `debug` or `switchyard=info`. Falls back to RUST_LOG.
    #[arg(long, env = "SWITCHYARD_LOG")]
    pub log: Option<String>,

    /// Channel command: `<handler> [<child> ...] <method> [--key value ...]`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl PublisherArgs {
    pub fn config(&self) -> PublisherConfig {
        PublisherConfig {
            serve: self.serve,
            host: self.host.clone(),
            port: self.port,
            format: self.format,
            log: self
                .log
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG.to_string()),
        }
    }
}
