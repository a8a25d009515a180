//! LogDeck - log dashboard server and CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Set JSON output mode if requested
    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("logdeck={0},tower_http={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let opts = GlobalOpts {
        config: cli.config,
        log_dir: cli.log_dir,
    };

    let result = match cli.command.unwrap_or(Commands::Serve(cli.serve)) {
        Commands::Serve(args) => serve::execute(&opts, args).await,
        Commands::Query(args) => query::execute(&opts, args),
        Commands::Tail(args) => tail::execute(&opts, args).await,
        Commands::Sources => sources::execute(&opts),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
