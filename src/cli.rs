//! Command-line interface definition for IAMGuard
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

/// IAMGuard - chat and IAM policy recommendation console
///
/// Signs in through the configured identity provider, then lets you chat
/// with the assistant backend and review policy recommendations.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "iamguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the backend API base URL
    #[arg(long, env = "IAMGUARD_API_URL")]
    pub api_url: Option<String>,

    /// Seed illustrative sessions when the backend is unreachable
    #[arg(long)]
    pub dev_fallback: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for IAMGuard
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and start the interactive console (default)
    Console {
        /// Authorization code from the redirect URL, skipping the prompt
        #[arg(long)]
        code: Option<String>,
    },

    /// Print the identity provider login URL and exit
    LoginUrl,

    /// Print the effective configuration and exit
    Config,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_no_command() {
        let cli = Cli::try_parse_from(["iamguard"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parses_console_code() {
        let cli = Cli::try_parse_from(["iamguard", "console", "--code", "abc"]).unwrap();
        match cli.command {
            Some(Commands::Console { code }) => assert_eq!(code.as_deref(), Some("abc")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "iamguard",
            "--api-url",
            "http://api.test",
            "--dev-fallback",
            "login-url",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://api.test"));
        assert!(cli.dev_fallback);
        assert!(matches!(cli.command, Some(Commands::LoginUrl)));
    }
}
