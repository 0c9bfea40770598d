use anyhow::{Context, Result};
use callslicer::app::{render_config, run_stream_command};
use callslicer::cli::{Cli, Commands, ConfigAction, log_filter};
use callslicer::config::Config;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            drain_timeout,
        } => {
            let config = load_config(cli.config.as_deref())?;
            tracing::info!(version = %callslicer::version_string(), "starting");
            let summary = run_stream_command(config, input, drain_timeout)
                .await
                .context("callslicer run failed")?;
            if summary.abandoned_uploads > 0 {
                anyhow::bail!(
                    "{} upload(s) did not finish before the drain timeout",
                    summary.abandoned_uploads
                );
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", render_config(&config)?);
            }
            ConfigAction::Path => {
                println!("{}", Config::default_path().display());
            }
        },
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over the -v/-q flags when set.
fn init_tracing(quiet: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,callslicer={}", log_filter(quiet, verbose))));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides()?)
}
