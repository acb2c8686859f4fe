//! Seaworthy CLI entry point.

use anyhow::Result;
use clap::Parser;

use seaworthy::cli::{commands, Cli, Commands};
use seaworthy::domain::models::Config;
use seaworthy::infrastructure::config::ConfigLoader;
use seaworthy::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => seaworthy::cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => seaworthy::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Policy(ref args) => commands::policy::execute(args, &config, cli.json),
        Commands::Classify(ref args) => commands::classify::execute(args, &config, cli.json),
        Commands::Queue(args) => commands::queue::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        seaworthy::cli::handle_error(err, cli.json);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}
