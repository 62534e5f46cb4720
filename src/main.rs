//! IAMGuard - chat and IAM policy recommendation console
//!
#![doc = "Main entry point for the IAMGuard console."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iamguard::cli::{Cli, Commands};
use iamguard::commands;
use iamguard::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    iamguard::metrics::init_metrics_exporter();

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path().to_string_lossy().to_string());
    let config = Config::load(&config_path, &cli)?;

    // Execute command
    match cli.command.unwrap_or(Commands::Console { code: None }) {
        Commands::Console { code } => {
            config.validate()?;
            commands::console::run_console(config, code).await?;
            Ok(())
        }
        Commands::LoginUrl => {
            commands::print_login_url(&config)?;
            Ok(())
        }
        Commands::Config => {
            commands::print_config(&config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "iamguard=debug"
    } else {
        "iamguard=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
