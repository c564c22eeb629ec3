mod cli;
mod commands;
mod output;

use anyhow::Result;
use cli::{Cli, Command, LogFormat};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Command::Render { variant, seed, location } => commands::render(variant, seed, &location),
        Command::Validate { variant, seed, location } => commands::validate(variant, seed, &location),
        Command::List => commands::list(),
        Command::Run {
            scenarios,
            engine,
            seed,
            location,
            parallel,
            output,
        } => {
            commands::run(
                cli.config,
                scenarios,
                engine,
                seed,
                location,
                parallel,
                output,
            )
            .await
        }
        Command::LookupDisk { id } => commands::lookup_disk(cli.config, &id).await,
    }
}
