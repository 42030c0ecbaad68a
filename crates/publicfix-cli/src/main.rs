//! PublicFix CLI - sign in to PublicFix from the terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use publicfix_config::{Config, Paths};

/// PublicFix CLI - authentication for the PublicFix road-damage reporter.
#[derive(Parser)]
#[command(name = "publicfix")]
#[command(about = "PublicFix CLI for authentication and credential management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login,

    /// Sign out and remove the stored credential
    Logout,

    /// Check authentication status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Paths::new().and_then(|paths| Config::load(&paths)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    publicfix_config::init_logging(log_level);

    let result = match cli.command {
        Commands::Login => commands::login(&config, &cli.format).await,
        Commands::Logout => commands::logout(&cli.format).await,
        Commands::Status => commands::status(&cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
