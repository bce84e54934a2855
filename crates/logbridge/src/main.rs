//! logbridge CLI - pipe, inspect and manage aggregated development logs

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
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("logbridge={0},logbridge_dispatch={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).without_time())
        .init();

    let ctx = match Context::load(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Pipe(args) => pipe::execute(&ctx, args).await,
        Commands::Status => status::execute(&ctx).await,
        Commands::Logs(args) => logs::execute(&ctx, args).await,
        Commands::Rotate { dir } => rotate::execute(&ctx, dir),
        Commands::Clear(args) => clear::execute(&ctx, args).await,
        Commands::Show { session, tag } => show::execute(&ctx, session, tag).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
