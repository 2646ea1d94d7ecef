//! ipk - webOS package builder CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ipk_cli::cmd;
use ipk_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Package(args) => cmd::package::package(&args, config_path).await,
        Commands::Check { dirs } => cmd::check::check(&dirs, config_path).await,
    }
}
