mod cli;
mod config;
mod dataset;
mod error;
mod extract;
mod output;
mod run;
mod time;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.options.log_level)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Past { start, days } => match command::past(&cli.options, start, *days).await {
            Ok(summary) => println!("{}", summary),
            Err(e) => eprintln!("Error: {:#}", e),
        },
        Commands::Latest { now } => match command::latest(&cli.options, now.as_deref()).await {
            Ok(summary) => println!("{}", summary),
            Err(e) => eprintln!("Error: {:#}", e),
        },
    }

    Ok(())
}
