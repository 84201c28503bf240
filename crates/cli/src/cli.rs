//! Command-line interface definitions for concord.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Exit early with success when the `--check` flag is set.
///
/// Expands to an early `return Ok(())`, so it must be used in a function
/// returning a `Result`, after the configuration has been loaded.
///
/// # Example
///
/// ```ignore
/// use clap::Parser;
/// use concord_cli::{Cli, check_config};
///
/// #[tokio::main]
/// async fn main() -> eyre::Result<()> {
///     let cli = Cli::parse();
///     // ... load config ...
///     check_config!(cli);
///     // ... start polling ...
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! check_config {
    ($cli:expr) => {
        if $cli.check {
            println!("Configuration is valid");
            return Ok(());
        }
    };
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Command-line interface for the concord consensus poller.
#[derive(Parser, Debug, Clone)]
#[command(name = "concord")]
#[command(about = "Tracks the block a pool of Ethereum nodes agrees on")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "concord.toml", env = "CONCORD_CONFIG")]
    pub config: PathBuf,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "CONCORD_LOG")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Validate config and exit
    #[arg(long)]
    pub check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from([
            "concord",
            "--config",
            "test.toml",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.config, PathBuf::from("test.toml"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(!cli.check);
    }

    #[test]
    fn test_cli_parse_check_flag() {
        let cli = Cli::parse_from(["concord", "--check"]);
        assert!(cli.check);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["concord"]);
        assert_eq!(cli.config, PathBuf::from("concord.toml"));
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(!cli.check);
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["concord", "--log-format", "xml"]).is_err());
    }
}
