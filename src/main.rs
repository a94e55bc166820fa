//! Harmony CLI entry point.

use clap::Parser;

use harmony::cli::commands;
use harmony::cli::{handle_error, Cli, Commands};
use harmony::infrastructure::config::ConfigLoader;
use harmony::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json).await,
        Commands::Classify(args) => commands::classify::execute(args, &config, cli.json).await,
        Commands::Rules(args) => commands::rules::execute(args, &config, cli.json).await,
        Commands::Submit(args) => commands::submit::execute(args, &config, cli.json).await,
        Commands::Metrics(args) => commands::metrics::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
