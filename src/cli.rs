//! Command-line interface for callslicer
//!
//! Provides argument parsing using clap derive macros.

use crate::defaults::DRAIN_TIMEOUT;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Slice radio frame streams into calls and upload them as WAV
#[derive(Parser, Debug)]
#[command(
    name = "callslicer",
    version,
    about = "Slice radio frame streams into calls and upload them as WAV"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume a JSON-lines frame stream and upload finished calls
    Run {
        /// Input file (default: source.path from config, else stdin)
        #[arg(long, short = 'i', value_name = "PATH")]
        input: Option<PathBuf>,

        /// How long to wait for in-flight uploads at shutdown. Examples: 30s, 2m
        #[arg(long, value_name = "DURATION", default_value = DRAIN_TIMEOUT, value_parser = parse_duration)]
        drain_timeout: Duration,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// `tracing` filter directive for the given verbosity flags.
pub fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["callslicer", "run"]).unwrap();
        match cli.command {
            Commands::Run {
                input,
                drain_timeout,
            } => {
                assert!(input.is_none());
                assert_eq!(drain_timeout, Duration::from_secs(30));
            }
            _ => panic!("Expected Run command"),
        }
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "callslicer",
            "run",
            "--input",
            "/tmp/frames.jsonl",
            "--drain-timeout",
            "1m30s",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                input,
                drain_timeout,
            } => {
                assert_eq!(input, Some(PathBuf::from("/tmp/frames.jsonl")));
                assert_eq!(drain_timeout, Duration::from_secs(90));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_options_after_command() {
        let cli =
            Cli::try_parse_from(["callslicer", "run", "-vv", "--config", "/etc/cs.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/cs.toml")));
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["callslicer", "config", "show", "-q"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Config { action } => assert_eq!(action, ConfigAction::Show),
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["callslicer"]).is_err());
        assert!(Cli::try_parse_from(["callslicer", "bogus"]).is_err());
    }

    #[test]
    fn test_parse_duration_bare_number() {
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration(" 0 ").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_humantime() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(false, 0), "info");
        assert_eq!(log_filter(false, 1), "debug");
        assert_eq!(log_filter(false, 5), "trace");
        assert_eq!(log_filter(true, 2), "warn");
    }
}
